//! Benchmarks for pairwise matching and cross-scanner analysis.
//!
//! Run with: cargo bench --bench matcher_benchmark

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sbom_reconcile::{
    model::Component, Analyzer, Matcher, MatchPolicy, NormalizedScan, NormalizedSbom, ScannerId,
    SchemaFamily,
};
use std::collections::BTreeSet;
use std::hint::black_box;

/// Generate one scanner's view of a project with `count` components.
///
/// `drift` shifts the patch version of every n-th component so the other
/// scanner sees it as a fuzzy rather than exact match.
fn generate_sbom(scanner: ScannerId, count: usize, drift: usize) -> NormalizedSbom {
    let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::CycloneDx);
    for i in 0..count {
        let name = format!("component-{i}");
        let patch = if drift > 0 && i % drift == 0 { i % 100 + 1 } else { i % 100 };
        let version = format!("1.{}.{patch}", i % 10);
        let purl = format!("pkg:npm/{name}@{version}");
        sbom.components.push(
            Component::new(&name, &version)
                .with_purl(Some(&purl))
                .with_scanner(scanner.clone()),
        );
    }
    sbom
}

fn bench_match_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_pair");

    for size in [100, 250, 500, 1000] {
        let a = generate_sbom(ScannerId::trivy(), size, 0);
        let b = generate_sbom(ScannerId::syft(), size, 10);
        let matcher = Matcher::default();

        group.bench_with_input(BenchmarkId::new("balanced", size), &size, |bench, _| {
            bench.iter(|| {
                black_box(matcher.match_components(black_box(&a.components), black_box(&b.components)))
            });
        });
    }

    group.finish();
}

fn bench_presets(c: &mut Criterion) {
    let mut group = c.benchmark_group("presets");
    let a = generate_sbom(ScannerId::trivy(), 500, 0);
    let b = generate_sbom(ScannerId::syft(), 500, 5);

    for preset in ["strict", "balanced", "permissive"] {
        let Some(policy) = MatchPolicy::from_preset(preset) else {
            continue;
        };
        let matcher = Matcher::new(policy);
        group.bench_function(preset, |bench| {
            bench.iter(|| {
                black_box(matcher.match_components(black_box(&a.components), black_box(&b.components)))
            });
        });
    }

    group.finish();
}

fn bench_analyze_three_scanners(c: &mut Criterion) {
    let scan = NormalizedScan {
        sboms: vec![
            generate_sbom(ScannerId::trivy(), 500, 0),
            generate_sbom(ScannerId::syft(), 500, 7),
            generate_sbom(ScannerId::cdxgen(), 450, 11),
        ],
        ..NormalizedScan::default()
    };
    let analyzer = Analyzer::default();
    let tech_stack = BTreeSet::new();

    c.bench_function("analyze_3x500", |bench| {
        bench.iter(|| black_box(analyzer.analyze(black_box(&scan), &tech_stack)));
    });
}

criterion_group!(
    benches,
    bench_match_pair,
    bench_presets,
    bench_analyze_three_scanners
);
criterion_main!(benches);
