//! Per-scan reconciliation summary.
//!
//! Pairwise matches are folded transitively: every component of every scanner
//! lives in one arena slot, each match joins two slots in a [`DisjointSet`],
//! and the resulting sets become common-package entries (two or more members)
//! or scanner-unique components (a single member).
//!
//! An entry is `exact` only when every link inside it is exact; a single
//! fuzzy link makes the whole entry fuzzy.

mod union_find;

pub use union_find::DisjointSet;

use crate::matching::{FieldScores, MatchType, Matcher, ScannerPairMatches};
use crate::model::{Component, NormalizedSbom, ScanRecord, ScannerId, ScannerRegistry, SchemaFamily};
use crate::normalize::Normalizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Scores of the link that justifies a fuzzy entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScores {
    #[serde(flatten)]
    pub fields: FieldScores,
    pub combined: f64,
}

/// One group of components that several scanners agree on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonPackage {
    /// Field-richest member of the group
    pub representative: Component,
    pub found_in: BTreeSet<ScannerId>,
    pub match_type: MatchType,
    /// Every member, one record per scanner occurrence
    pub members: Vec<Component>,
    /// Counterpart of the strongest fuzzy link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_to: Option<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_scores: Option<MatchScores>,
}

/// Common packages split by match type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonPackages {
    pub exact: Vec<CommonPackage>,
    pub fuzzy: Vec<CommonPackage>,
}

impl CommonPackages {
    /// All entries, exact first.
    pub fn iter(&self) -> impl Iterator<Item = &CommonPackage> {
        self.exact.iter().chain(self.fuzzy.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.fuzzy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.fuzzy.is_empty()
    }
}

/// How much of one scanner's output the other scanners confirm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementScore {
    pub exact: usize,
    pub fuzzy: usize,
    pub unique: usize,
    pub total: usize,
    /// `max(0, 100 * (exact + 0.5 * fuzzy) / total - 10 * unique / total)`
    pub score: f64,
}

impl AgreementScore {
    #[must_use]
    pub fn new(exact: usize, fuzzy: usize, unique: usize, total: usize) -> Self {
        let score = if total == 0 {
            0.0
        } else {
            let total_f = total as f64;
            let common_ratio = 0.5f64.mul_add(fuzzy as f64, exact as f64) / total_f;
            let unique_ratio = unique as f64 / total_f;
            common_ratio.mul_add(100.0, -(unique_ratio * 10.0)).max(0.0)
        };
        Self {
            exact,
            fuzzy,
            unique,
            total,
            score,
        }
    }
}

/// Derived reconciliation summary for one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_counts: BTreeMap<ScannerId, usize>,
    pub common_packages: CommonPackages,
    pub unique_packages: BTreeMap<ScannerId, Vec<Component>>,
    pub tech_stack: BTreeSet<String>,
    pub scores: BTreeMap<ScannerId, AgreementScore>,
    /// Scanners with no usable output and why
    pub failed_scanners: BTreeMap<ScannerId, String>,
}

impl AnalysisResult {
    /// Whether `(name, version)` is unique to `scanner`.
    #[must_use]
    pub fn is_unique_to(&self, scanner: &ScannerId, name: &str, version: &str) -> bool {
        self.unique_packages.get(scanner).is_some_and(|list| {
            list.iter()
                .any(|c| c.name == name && c.version == version)
        })
    }
}

/// Normalized scanner outputs of one scan plus the scanners that produced nothing usable.
#[derive(Debug, Clone, Default)]
pub struct NormalizedScan {
    pub sboms: Vec<NormalizedSbom>,
    pub failed: BTreeMap<ScannerId, String>,
}

impl NormalizedScan {
    /// Normalized output of one scanner.
    #[must_use]
    pub fn get(&self, scanner: &ScannerId) -> Option<&NormalizedSbom> {
        self.sboms.iter().find(|s| &s.scanner == scanner)
    }
}

/// Normalize every successful result of a scan record.
///
/// Failed results and documents that no longer normalize are reported in
/// `failed` and otherwise skipped.
#[must_use]
pub fn normalize_record(
    record: &ScanRecord,
    registry: &ScannerRegistry,
    normalizer: &Normalizer,
) -> NormalizedScan {
    let mut scan = NormalizedScan::default();
    for (scanner, result) in &record.results {
        if record.is_running(scanner) && result.sbom.is_none() {
            continue;
        }
        if let Some(error) = &result.error {
            scan.failed.insert(scanner.clone(), error.clone());
            continue;
        }
        let Some(doc) = &result.sbom else {
            continue;
        };
        let hint = registry.get(scanner).map_or(SchemaFamily::Auto, |s| s.schema);
        match normalizer.normalize(scanner, hint, doc) {
            Ok(sbom) => scan.sboms.push(sbom),
            Err(e) => {
                tracing::warn!(scanner = %scanner, error = %e, "Stored SBOM no longer normalizes");
                scan.failed.insert(scanner.clone(), e.to_string());
            }
        }
    }
    scan
}

/// Builds [`AnalysisResult`]s from normalized scanner output.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    matcher: Matcher,
}

struct Link {
    a: usize,
    b: usize,
    scores: FieldScores,
    combined: f64,
    match_type: MatchType,
}

impl Analyzer {
    #[must_use]
    pub const fn new(matcher: Matcher) -> Self {
        Self { matcher }
    }

    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Analyze a normalized scan. `tech_stack` seeds the tag set (e.g. tags
    /// detected from the repository checkout).
    #[must_use]
    pub fn analyze(&self, scan: &NormalizedScan, tech_stack: &BTreeSet<String>) -> AnalysisResult {
        let sboms = &scan.sboms;

        // Arena: offsets[s] is the first slot of scanner s.
        let mut offsets = Vec::with_capacity(sboms.len());
        let mut arena: Vec<(usize, &Component)> = Vec::new();
        for (s, sbom) in sboms.iter().enumerate() {
            offsets.push(arena.len());
            arena.extend(sbom.components.iter().map(|c| (s, c)));
        }

        let pair_matches = self.matcher.match_all(sboms);
        let links = collect_links(sboms, &offsets, &pair_matches);

        let mut sets = DisjointSet::new(arena.len());
        for link in &links {
            sets.union(link.a, link.b);
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for slot in 0..arena.len() {
            groups.entry(sets.find(slot)).or_default().push(slot);
        }
        let mut links_by_root: HashMap<usize, Vec<&Link>> = HashMap::new();
        for link in &links {
            links_by_root.entry(sets.find(link.a)).or_default().push(link);
        }

        let mut result = AnalysisResult::default();
        let mut per_scanner: BTreeMap<ScannerId, (usize, usize, usize)> = BTreeMap::new();

        for sbom in sboms {
            result
                .total_counts
                .insert(sbom.scanner.clone(), sbom.components.len());
            per_scanner.entry(sbom.scanner.clone()).or_default();
        }

        for (root, slots) in &groups {
            if slots.len() == 1 {
                let (s, component) = arena[slots[0]];
                let scanner = &sboms[s].scanner;
                result
                    .unique_packages
                    .entry(scanner.clone())
                    .or_default()
                    .push(component.clone());
                if let Some(counts) = per_scanner.get_mut(scanner) {
                    counts.2 += 1;
                }
                continue;
            }

            let group_links = links_by_root.get(root).map_or(&[][..], Vec::as_slice);
            let entry = build_entry(&arena, sboms, slots, group_links);
            for &slot in slots {
                let scanner = &sboms[arena[slot].0].scanner;
                if let Some(counts) = per_scanner.get_mut(scanner) {
                    match entry.match_type {
                        MatchType::Exact => counts.0 += 1,
                        MatchType::Fuzzy => counts.1 += 1,
                    }
                }
            }
            match entry.match_type {
                MatchType::Exact => result.common_packages.exact.push(entry),
                MatchType::Fuzzy => result.common_packages.fuzzy.push(entry),
            }
        }

        let by_key = |x: &CommonPackage, y: &CommonPackage| {
            x.representative
                .key()
                .cmp(&y.representative.key())
        };
        result.common_packages.exact.sort_by(by_key);
        result.common_packages.fuzzy.sort_by(by_key);
        for list in result.unique_packages.values_mut() {
            list.sort_by_key(Component::key);
        }

        for (scanner, (exact, fuzzy, unique)) in per_scanner {
            let total = result.total_counts.get(&scanner).copied().unwrap_or(0);
            result
                .scores
                .insert(scanner, AgreementScore::new(exact, fuzzy, unique, total));
        }

        result.tech_stack = tech_stack
            .iter()
            .map(|t| t.to_lowercase())
            .chain(sboms.iter().flat_map(|s| s.ecosystems.iter().map(|e| e.to_lowercase())))
            .collect();
        result.failed_scanners.clone_from(&scan.failed);

        tracing::debug!(
            scanners = sboms.len(),
            exact = result.common_packages.exact.len(),
            fuzzy = result.common_packages.fuzzy.len(),
            unique = result.unique_packages.values().map(Vec::len).sum::<usize>(),
            "Analysis complete"
        );
        result
    }
}

fn collect_links(
    sboms: &[NormalizedSbom],
    offsets: &[usize],
    pair_matches: &[ScannerPairMatches],
) -> Vec<Link> {
    let position: HashMap<&ScannerId, usize> = sboms
        .iter()
        .enumerate()
        .map(|(i, s)| (&s.scanner, i))
        .collect();

    let mut links = Vec::new();
    for pair in pair_matches {
        let (Some(&sa), Some(&sb)) = (position.get(&pair.scanner_a), position.get(&pair.scanner_b))
        else {
            continue;
        };
        for m in &pair.matches {
            links.push(Link {
                a: offsets[sa] + m.a,
                b: offsets[sb] + m.b,
                scores: m.field_scores,
                combined: m.combined_score,
                match_type: m.match_type,
            });
        }
    }
    links
}

fn build_entry(
    arena: &[(usize, &Component)],
    sboms: &[NormalizedSbom],
    slots: &[usize],
    links: &[&Link],
) -> CommonPackage {
    let member = |slot: usize| {
        let (s, component) = arena[slot];
        let mut c = component.clone();
        c.source_scanners.insert(sboms[s].scanner.clone());
        c
    };

    let members: Vec<Component> = slots.iter().map(|&slot| member(slot)).collect();
    let found_in: BTreeSet<ScannerId> = slots
        .iter()
        .map(|&slot| sboms[arena[slot].0].scanner.clone())
        .collect();

    // Richest first; ties go to scanner order then (name, version).
    let rep_slot = slots
        .iter()
        .copied()
        .min_by(|&x, &y| {
            let (cx, cy) = (arena[x].1, arena[y].1);
            cy.richness()
                .cmp(&cx.richness())
                .then_with(|| sboms[arena[x].0].scanner.cmp(&sboms[arena[y].0].scanner))
                .then_with(|| cx.key().cmp(&cy.key()))
        })
        .unwrap_or(slots[0]);

    let match_type = links
        .iter()
        .map(|l| l.match_type)
        .max()
        .unwrap_or(MatchType::Exact);

    let mut representative = member(rep_slot);
    for m in &members {
        representative.absorb_identifiers(m);
    }

    let (similar_to, match_scores) = if match_type == MatchType::Fuzzy {
        strongest_fuzzy(links, arena)
            .map(|link| {
                let other = if link.a == rep_slot {
                    link.b
                } else if link.b == rep_slot {
                    link.a
                } else if arena[link.b].0 != arena[rep_slot].0 {
                    link.b
                } else {
                    link.a
                };
                (
                    Some(member(other)),
                    Some(MatchScores {
                        fields: link.scores,
                        combined: link.combined,
                    }),
                )
            })
            .unwrap_or((None, None))
    } else {
        (None, None)
    };

    CommonPackage {
        representative,
        found_in,
        match_type,
        members,
        similar_to,
        match_scores,
    }
}

fn strongest_fuzzy<'l>(links: &[&'l Link], arena: &[(usize, &Component)]) -> Option<&'l Link> {
    links
        .iter()
        .copied()
        .filter(|l| l.match_type == MatchType::Fuzzy)
        .min_by(|x, y| {
            y.combined
                .total_cmp(&x.combined)
                .then_with(|| arena[x.a].1.key().cmp(&arena[y.a].1.key()))
                .then_with(|| arena[x.b].1.key().cmp(&arena[y.b].1.key()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaFamily;

    fn sbom(scanner: ScannerId, comps: &[(&str, &str)]) -> NormalizedSbom {
        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::CycloneDx);
        sbom.components = comps
            .iter()
            .map(|(n, v)| Component::new(n, v).with_scanner(scanner.clone()))
            .collect();
        sbom
    }

    fn scan(sboms: Vec<NormalizedSbom>) -> NormalizedScan {
        NormalizedScan {
            sboms,
            failed: BTreeMap::new(),
        }
    }

    #[test]
    fn test_exact_pair_and_unique() {
        let input = scan(vec![
            sbom(ScannerId::trivy(), &[("lodash", "4.17.21"), ("left-pad", "1.3.0")]),
            sbom(ScannerId::syft(), &[("lodash", "4.17.21")]),
        ]);
        let result = Analyzer::default().analyze(&input, &BTreeSet::new());

        assert_eq!(result.common_packages.exact.len(), 1);
        let entry = &result.common_packages.exact[0];
        assert_eq!(entry.found_in.len(), 2);
        assert_eq!(entry.match_type, MatchType::Exact);
        assert!(entry.similar_to.is_none());

        assert!(result.is_unique_to(&ScannerId::trivy(), "left-pad", "1.3.0"));
        assert!(!result.unique_packages.contains_key(&ScannerId::syft()));
        assert_eq!(result.total_counts[&ScannerId::trivy()], 2);
    }

    #[test]
    fn test_fuzzy_link_makes_whole_group_fuzzy() {
        let input = scan(vec![
            sbom(ScannerId::trivy(), &[("lodash", "4.17.21")]),
            sbom(ScannerId::syft(), &[("lodash", "4.17.21")]),
            sbom(ScannerId::cdxgen(), &[("lodash", "4.17.20")]),
        ]);
        let result = Analyzer::default().analyze(&input, &BTreeSet::new());

        assert!(result.common_packages.exact.is_empty());
        assert_eq!(result.common_packages.fuzzy.len(), 1);
        let entry = &result.common_packages.fuzzy[0];
        assert_eq!(entry.found_in.len(), 3);
        assert_eq!(entry.members.len(), 3);
        let scores = entry.match_scores.unwrap();
        assert_eq!(scores.fields.name, 1.0);
        assert!((0.3..=0.8).contains(&scores.fields.version));
        assert!(entry.similar_to.is_some());
    }

    #[test]
    fn test_representative_is_richest() {
        let mut plain = sbom(ScannerId::trivy(), &[("express", "4.18.2")]);
        let mut rich = sbom(ScannerId::syft(), &[("express", "4.18.2")]);
        rich.components[0] = rich.components[0]
            .clone()
            .with_purl(Some("pkg:npm/express@4.18.2"));
        plain.components[0] = plain.components[0]
            .clone()
            .with_cpe(Some("cpe:2.3:a:expressjs:express:4.18.2:*:*:*:*:node.js:*:*"))
            .with_purl(Some("pkg:npm/express@4.18.2"));
        let result = Analyzer::default().analyze(&scan(vec![plain, rich]), &BTreeSet::new());
        let entry = &result.common_packages.exact[0];
        assert!(entry.representative.cpe.is_some());
        assert!(entry.representative.source_scanners.contains(&ScannerId::trivy()));
    }

    #[test]
    fn test_agreement_scores() {
        let score = AgreementScore::new(8, 2, 0, 10);
        assert!((score.score - 90.0).abs() < 1e-9);
        assert_eq!(AgreementScore::new(0, 0, 5, 5).score, 0.0);
        assert_eq!(AgreementScore::new(0, 0, 0, 0).score, 0.0);
    }

    #[test]
    fn test_tech_stack_union_case_insensitive() {
        let mut a = sbom(ScannerId::trivy(), &[]);
        a.ecosystems.insert("nodejs".into());
        let seed: BTreeSet<String> = ["NodeJS".to_string(), "Docker".to_string()].into();
        let result = Analyzer::default().analyze(&scan(vec![a]), &seed);
        assert_eq!(result.tech_stack.len(), 2);
        assert!(result.tech_stack.contains("docker"));
    }
}
