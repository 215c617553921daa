//! End-to-end reconciliation tests over real scanner output shapes.
//!
//! Fixtures: Trivy JSON, Syft JSON and cdxgen CycloneDX describing the same
//! npm project, plus a GitHub dependency-graph SPDX export (bare and in the
//! API's `{"sbom": ...}` envelope).

use sbom_reconcile::{
    analysis::{normalize_record, NormalizedScan},
    graph::GraphBuilder,
    matching::MatchType,
    merge::{MergeOptions, MergeStatus, SelectedPackage},
    model::{SbomResult, ScanRecord, ScannerRegistry, SchemaFamily},
    AnalysisResult, Analyzer, Matcher, Merger, NormalizedSbom, Normalizer, ScannerId,
    UniqueSelection,
};
use std::collections::BTreeSet;
use std::path::Path;

// ============================================================================
// Test Fixtures
// ============================================================================

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn fixture(name: &str) -> serde_json::Value {
    let path = Path::new(FIXTURES_DIR).join(name);
    let content = std::fs::read_to_string(&path).expect("fixture exists");
    serde_json::from_str(&content).expect("fixture is JSON")
}

fn normalize(scanner: ScannerId, name: &str) -> NormalizedSbom {
    Normalizer::new()
        .normalize(&scanner, SchemaFamily::Auto, &fixture(name))
        .expect("fixture normalizes")
}

fn three_scanners() -> NormalizedScan {
    NormalizedScan {
        sboms: vec![
            normalize(ScannerId::trivy(), "trivy.json"),
            normalize(ScannerId::syft(), "syft.json"),
            normalize(ScannerId::cdxgen(), "cdxgen.cdx.json"),
        ],
        ..NormalizedScan::default()
    }
}

fn analyze(scan: &NormalizedScan) -> AnalysisResult {
    Analyzer::default().analyze(scan, &BTreeSet::new())
}

// ============================================================================
// Normalization
// ============================================================================

mod normalization_tests {
    use super::*;

    #[test]
    fn test_every_family_is_detected() {
        let normalizer = Normalizer::new();
        for (name, family) in [
            ("trivy.json", SchemaFamily::TrivyJson),
            ("syft.json", SchemaFamily::SyftJson),
            ("cdxgen.cdx.json", SchemaFamily::CycloneDx),
            ("github.spdx.json", SchemaFamily::Spdx),
        ] {
            assert_eq!(normalizer.detect_family(&fixture(name)), Some(family), "{name}");
        }
    }

    #[test]
    fn test_identifiers_survive_normalization() {
        let syft = normalize(ScannerId::syft(), "syft.json");
        let lodash = syft.components.iter().find(|c| c.name == "lodash").unwrap();
        assert_eq!(lodash.purl.as_deref(), Some("pkg:npm/lodash@4.17.21"));
        assert!(lodash.cpe.as_deref().unwrap().starts_with("cpe:2.3:a:lodash"));

        let spdx = normalize(ScannerId::new("github"), "github.spdx.json");
        assert_eq!(spdx.component_count(), 2);
        let lodash = spdx.components.iter().find(|c| c.name == "lodash").unwrap();
        assert!(lodash.cpe.is_some());
        assert!(lodash.licenses.is_empty(), "NOASSERTION is not a license");
        assert_eq!(spdx.relationships.len(), 1, "DESCRIBES edges from the document are skipped");
    }

    #[test]
    fn test_github_api_envelope_matches_bare_export() {
        let bare = normalize(ScannerId::ghas(), "github.spdx.json");
        let enveloped = normalize(ScannerId::ghas(), "github-dependency-graph.json");
        assert_eq!(enveloped.format, SchemaFamily::Spdx);
        assert_eq!(enveloped.components, bare.components);
        assert_eq!(enveloped.relationships, bare.relationships);
    }

    #[test]
    fn test_tech_stack_from_ecosystems() {
        let trivy = normalize(ScannerId::trivy(), "trivy.json");
        assert!(trivy.ecosystems.contains("nodejs"));
        assert!(trivy.ecosystems.contains("github-actions"));
    }
}

// ============================================================================
// Analysis
// ============================================================================

mod analysis_tests {
    use super::*;

    #[test]
    fn test_lodash_triad_folds_into_one_fuzzy_entry() {
        let analysis = analyze(&three_scanners());

        let lodash: Vec<_> = analysis
            .common_packages
            .iter()
            .filter(|p| p.representative.name == "lodash")
            .collect();
        assert_eq!(lodash.len(), 1);
        let entry = lodash[0];
        assert_eq!(entry.match_type, MatchType::Fuzzy);
        assert_eq!(
            entry.found_in,
            [ScannerId::trivy(), ScannerId::syft(), ScannerId::cdxgen()].into()
        );
        let scores = entry.match_scores.expect("fuzzy entries carry scores");
        assert!((scores.fields.name - 1.0).abs() < f64::EPSILON);
        assert!((0.3..=0.8).contains(&scores.fields.version));
    }

    #[test]
    fn test_exact_agreement_on_express() {
        let analysis = analyze(&three_scanners());
        assert_eq!(analysis.common_packages.exact.len(), 1);
        let express = &analysis.common_packages.exact[0];
        assert_eq!(express.representative.name, "express");
        assert_eq!(express.found_in.len(), 3);
        assert!((express.match_scores.map_or(1.0, |s| s.combined) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unique_and_common_partition_each_scanner() {
        let scan = three_scanners();
        let analysis = analyze(&scan);

        for sbom in &scan.sboms {
            let scanner = &sbom.scanner;
            let unique = analysis.unique_packages.get(scanner).map_or(0, Vec::len);
            let common = analysis
                .common_packages
                .iter()
                .flat_map(|p| p.members.iter())
                .filter(|m| m.source_scanners.contains(scanner))
                .count();
            assert_eq!(
                unique + common,
                analysis.total_counts[scanner],
                "partition of {scanner}"
            );
        }

        assert!(analysis.is_unique_to(&ScannerId::trivy(), "actions/checkout", "v4"));
        assert!(analysis.is_unique_to(&ScannerId::syft(), "zlib", "1.3"));
        assert!(analysis.is_unique_to(&ScannerId::cdxgen(), "debug", "2.6.9"));
    }

    #[test]
    fn test_pair_matching_is_symmetric() {
        let scan = three_scanners();
        let matcher = Matcher::default();
        let trivy = &scan.sboms[0].components;
        let cdxgen = &scan.sboms[2].components;

        let forward = matcher.match_components(trivy, cdxgen);
        let backward = matcher.match_components(cdxgen, trivy);
        assert_eq!(forward.len(), backward.len());
        for m in &forward {
            let mirrored = backward
                .iter()
                .find(|b| cdxgen[b.a].key() == cdxgen[m.b].key() && trivy[b.b].key() == trivy[m.a].key())
                .expect("mirrored match");
            assert_eq!(mirrored.match_type, m.match_type);
            assert!((mirrored.combined_score - m.combined_score).abs() < 1e-12);
        }
    }

    #[test]
    fn test_failed_scanner_is_reported_not_fatal() {
        let mut record = ScanRecord::new("scan-1", "https://github.com/example/app");
        let doc = fixture("trivy.json");
        let count = normalize(ScannerId::trivy(), "trivy.json").component_count();
        record
            .results
            .insert(ScannerId::trivy(), SbomResult::success(ScannerId::trivy(), doc, count));
        record.results.insert(
            ScannerId::syft(),
            SbomResult::failure(ScannerId::syft(), "syft exited with status 1"),
        );

        let scan = normalize_record(&record, &ScannerRegistry::default(), &Normalizer::new());
        let analysis = analyze(&scan);
        assert_eq!(analysis.total_counts[&ScannerId::trivy()], 3);
        assert!(analysis.failed_scanners.contains_key(&ScannerId::syft()));
        assert!(analysis.common_packages.is_empty());
    }
}

// ============================================================================
// Merge
// ============================================================================

mod merge_tests {
    use super::*;

    #[test]
    fn test_merge_selected_uniques() {
        let scan = three_scanners();
        let analysis = analyze(&scan);
        let mut selection = UniqueSelection::new();
        selection.insert(ScannerId::syft(), vec![SelectedPackage::new("zlib", "1.3")]);

        let merged = Merger::default().merge(&analysis, &selection, &scan).unwrap();
        assert_eq!(merged.component_count(), 3);

        let zlib = merged
            .components
            .iter()
            .find(|c| c.component.name == "zlib")
            .unwrap();
        assert!(zlib.selected);
        assert_eq!(zlib.match_status, MergeStatus::Unique);
        assert!(merged
            .components
            .iter()
            .filter(|c| c.component.name != "zlib")
            .all(|c| !c.selected));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let scan = three_scanners();
        let analysis = analyze(&scan);
        let merger = Merger::default();

        let mut merged = merger.merge(&analysis, &UniqueSelection::new(), &scan).unwrap();
        let first = merged.keys();
        let again = merger.merge(&analysis, &UniqueSelection::new(), &scan).unwrap();
        merged.merge_from(&again);
        assert_eq!(merged.keys(), first);
        assert_eq!(merged.component_count(), first.len());
    }

    #[test]
    fn test_dependencies_relinked_onto_survivors() {
        let scan = three_scanners();
        let analysis = analyze(&scan);
        let merged = Merger::default()
            .merge(&analysis, &UniqueSelection::new(), &scan)
            .unwrap();

        let refs: BTreeSet<String> = merged.components.iter().map(|c| c.merged_ref()).collect();
        assert!(!merged.dependencies.is_empty());
        for dep in &merged.dependencies {
            assert!(refs.contains(&dep.reference));
            assert!(dep.depends_on.iter().all(|d| refs.contains(d)));
        }
    }

    #[test]
    fn test_all_uniques_without_github_actions() {
        let scan = three_scanners();
        let analysis = analyze(&scan);
        let merger = Merger::new(MergeOptions {
            include_all_unique: true,
            exclude_github_actions: true,
        });
        let merged = merger.merge(&analysis, &UniqueSelection::new(), &scan).unwrap();
        let names: BTreeSet<&str> = merged
            .components
            .iter()
            .map(|c| c.component.name.as_str())
            .collect();
        assert!(names.contains("zlib"));
        assert!(names.contains("debug"));
        assert!(!names.contains("actions/checkout"));
    }

    #[test]
    fn test_cyclonedx_export_shape() {
        let scan = three_scanners();
        let analysis = analyze(&scan);
        let merged = Merger::default()
            .merge(&analysis, &UniqueSelection::new(), &scan)
            .unwrap();
        let doc = serde_json::to_value(merged.to_cyclonedx("scan-1")).unwrap();
        assert_eq!(doc["bomFormat"], "CycloneDX");
        assert_eq!(doc["specVersion"], "1.4");
        assert_eq!(
            doc["components"].as_array().unwrap().len(),
            merged.component_count()
        );
        assert!(doc["components"][0]["bom-ref"].is_string());
    }
}

// ============================================================================
// Graph
// ============================================================================

mod graph_tests {
    use super::*;

    #[test]
    fn test_every_edge_resolves_to_a_node() {
        for (scanner, name) in [
            (ScannerId::trivy(), "trivy.json"),
            (ScannerId::syft(), "syft.json"),
            (ScannerId::cdxgen(), "cdxgen.cdx.json"),
            (ScannerId::new("github"), "github.spdx.json"),
        ] {
            let graph = GraphBuilder::new().build(&normalize(scanner, name));
            assert!(graph.is_closed(), "{name}");
            assert_eq!(graph.metadata.total_nodes, graph.nodes.len());
        }
    }

    #[test]
    fn test_dangling_reference_is_dropped() {
        let graph = GraphBuilder::new().build(&normalize(ScannerId::cdxgen(), "cdxgen.cdx.json"));
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.metadata.dropped_edges, 1);
        let express = graph.node("pkg:npm/express@4.18.2").expect("purl is the node id");
        assert_eq!(express.properties.depth, Some(0));
    }

    #[test]
    fn test_syft_dependency_of_direction() {
        let graph = GraphBuilder::new().build(&normalize(ScannerId::syft(), "syft.json"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "pkg:npm/express@4.18.2");
        assert_eq!(graph.edges[0].target, "pkg:npm/lodash@4.17.21");
    }
}
