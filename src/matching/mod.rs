//! Cross-scanner component matching.
//!
//! For each unordered pair of scanners the [`Matcher`] first pairs components
//! whose normalized `(name, version)` agree exactly, then scores every
//! remaining cross pair on four fields (name, version, purl, cpe) and keeps
//! the best non-conflicting fuzzy pairs above the policy thresholds.
//!
//! Each component takes part in at most one match per scanner pair. Fuzzy
//! assignment is greedy, highest combined score first, with ties broken by
//! the `(name, version)` of the first scanner's component and then the
//! second's.

mod config;
mod purl;
mod scoring;
mod string_similarity;

pub use config::{FieldWeights, MatchPolicy};
pub use purl::{cpe_similarity, purl_similarity};
pub use scoring::{parse_semver_parts, version_similarity, FieldScores};
pub use string_similarity::{compute_token_similarity, name_similarity, tokenize};

use crate::model::{Component, NormalizedSbom, ScannerId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How a pair of components was matched.
///
/// Ordered from strongest to weakest, so the weakest link of a chain is the
/// maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
}

/// A match between two components of two distinct scanners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub a: Component,
    pub b: Component,
    pub field_scores: FieldScores,
    pub combined_score: f64,
    pub match_type: MatchType,
}

/// Index-based match inside one scanner pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMatch {
    /// Index into the first scanner's components
    pub a: usize,
    /// Index into the second scanner's components
    pub b: usize,
    pub field_scores: FieldScores,
    pub combined_score: f64,
    pub match_type: MatchType,
}

/// All matches between two scanners.
#[derive(Debug, Clone)]
pub struct ScannerPairMatches {
    pub scanner_a: ScannerId,
    pub scanner_b: ScannerId,
    pub matches: Vec<PairMatch>,
}

impl ScannerPairMatches {
    #[must_use]
    pub fn exact_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.match_type == MatchType::Exact)
            .count()
    }

    #[must_use]
    pub fn fuzzy_count(&self) -> usize {
        self.matches.len() - self.exact_count()
    }
}

/// Scores and pairs components across scanners.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    policy: MatchPolicy,
}

impl Matcher {
    #[must_use]
    pub const fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Field scores for a component pair. Symmetric in `a` and `b`.
    #[must_use]
    pub fn field_scores(&self, a: &Component, b: &Component) -> FieldScores {
        FieldScores {
            name: name_similarity(&a.name, &b.name),
            version: version_similarity(&a.version, &b.version),
            purl: match (&a.purl, &b.purl) {
                (Some(pa), Some(pb)) => purl_similarity(pa, pb),
                _ => None,
            },
            cpe: match (&a.cpe, &b.cpe) {
                (Some(ca), Some(cb)) => cpe_similarity(ca, cb),
                _ => None,
            },
        }
    }

    /// Score a single pair, returning a match when it is exact or passes the
    /// fuzzy thresholds.
    #[must_use]
    pub fn score(&self, a: &Component, b: &Component) -> Option<(FieldScores, f64, MatchType)> {
        if is_exact(a, b) {
            return Some((FieldScores::exact(), 1.0, MatchType::Exact));
        }
        let scores = self.field_scores(a, b);
        if scores.name < self.policy.min_name_score {
            return None;
        }
        let combined = scores.combined(&self.policy.weights);
        (combined >= self.policy.min_combined_score).then_some((scores, combined, MatchType::Fuzzy))
    }

    /// Match two component lists.
    #[must_use]
    pub fn match_components(&self, a: &[Component], b: &[Component]) -> Vec<PairMatch> {
        let mut used_a = vec![false; a.len()];
        let mut used_b = vec![false; b.len()];
        let mut matches = Vec::new();

        // Exact pass, in (name, version) order of the first list.
        let mut exact_index: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for j in sorted_indices(b) {
            exact_index
                .entry((b[j].name.as_str(), b[j].match_version()))
                .or_default()
                .push(j);
        }
        for i in sorted_indices(a) {
            let key = (a[i].name.as_str(), a[i].match_version());
            let Some(candidates) = exact_index.get(&key) else {
                continue;
            };
            if let Some(&j) = candidates.iter().find(|&&j| !used_b[j]) {
                used_a[i] = true;
                used_b[j] = true;
                matches.push(PairMatch {
                    a: i,
                    b: j,
                    field_scores: FieldScores::exact(),
                    combined_score: 1.0,
                    match_type: MatchType::Exact,
                });
            }
        }

        // Fuzzy pass over what is left.
        let rest_b: Vec<usize> = (0..b.len()).filter(|&j| !used_b[j]).collect();
        let mut candidates: Vec<PairMatch> = (0..a.len())
            .into_par_iter()
            .filter(|&i| !used_a[i])
            .flat_map_iter(|i| {
                rest_b.iter().filter_map(move |&j| {
                    self.score(&a[i], &b[j]).map(|(field_scores, combined_score, match_type)| {
                        PairMatch {
                            a: i,
                            b: j,
                            field_scores,
                            combined_score,
                            match_type,
                        }
                    })
                })
            })
            .collect();

        candidates.sort_by(|x, y| {
            y.combined_score
                .total_cmp(&x.combined_score)
                .then_with(|| compare_keys(&a[x.a], &a[y.a]))
                .then_with(|| compare_keys(&b[x.b], &b[y.b]))
        });

        let exact_count = matches.len();
        for candidate in candidates {
            if used_a[candidate.a] || used_b[candidate.b] {
                continue;
            }
            used_a[candidate.a] = true;
            used_b[candidate.b] = true;
            matches.push(candidate);
        }

        tracing::debug!(
            left = a.len(),
            right = b.len(),
            exact = exact_count,
            fuzzy = matches.len() - exact_count,
            "Matched component lists"
        );
        matches
    }

    /// Match every unordered pair of scanners.
    #[must_use]
    pub fn match_all(&self, sboms: &[NormalizedSbom]) -> Vec<ScannerPairMatches> {
        let pairs: Vec<(usize, usize)> = (0..sboms.len())
            .flat_map(|i| ((i + 1)..sboms.len()).map(move |j| (i, j)))
            .collect();

        pairs
            .par_iter()
            .map(|&(i, j)| ScannerPairMatches {
                scanner_a: sboms[i].scanner.clone(),
                scanner_b: sboms[j].scanner.clone(),
                matches: self.match_components(&sboms[i].components, &sboms[j].components),
            })
            .collect()
    }

    /// Owned match candidates for one scanner pair.
    #[must_use]
    pub fn match_candidates(&self, a: &NormalizedSbom, b: &NormalizedSbom) -> Vec<MatchCandidate> {
        self.match_components(&a.components, &b.components)
            .into_iter()
            .map(|m| MatchCandidate {
                a: a.components[m.a].clone(),
                b: b.components[m.b].clone(),
                field_scores: m.field_scores,
                combined_score: m.combined_score,
                match_type: m.match_type,
            })
            .collect()
    }
}

/// Exact match: equal name and equal version once build metadata is dropped.
#[must_use]
pub fn is_exact(a: &Component, b: &Component) -> bool {
    a.name == b.name && a.match_version() == b.match_version()
}

fn compare_keys(x: &Component, y: &Component) -> Ordering {
    x.name.cmp(&y.name).then_with(|| x.version.cmp(&y.version))
}

fn sorted_indices(components: &[Component]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..components.len()).collect();
    indices.sort_by(|&x, &y| compare_keys(&components[x], &components[y]));
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(name: &str, version: &str) -> Component {
        Component::new(name, version)
    }

    #[test]
    fn test_exact_match_scores_one() {
        let matcher = Matcher::default();
        let (scores, combined, kind) = matcher
            .score(&comp("lodash", "4.17.21"), &comp("Lodash", "4.17.21+sha.1"))
            .unwrap();
        assert_eq!(kind, MatchType::Exact);
        assert_eq!(combined, 1.0);
        assert_eq!(scores, FieldScores::exact());
    }

    #[test]
    fn test_fuzzy_lodash_versions() {
        let matcher = Matcher::default();
        let (scores, combined, kind) = matcher
            .score(&comp("lodash", "4.17.21"), &comp("lodash", "4.17.20"))
            .unwrap();
        assert_eq!(kind, MatchType::Fuzzy);
        assert_eq!(scores.name, 1.0);
        assert!((0.3..=0.8).contains(&scores.version));
        assert!((0.0..=1.0).contains(&combined));
    }

    #[test]
    fn test_identical_version_alone_never_matches() {
        let matcher = Matcher::default();
        assert!(matcher
            .score(&comp("left-pad", "1.0.0"), &comp("zlib", "1.0.0"))
            .is_none());
    }

    #[test]
    fn test_each_component_matched_once() {
        let matcher = Matcher::default();
        let a = vec![comp("lodash", "4.17.21")];
        let b = vec![comp("lodash", "4.17.20"), comp("lodash", "4.17.19")];
        let matches = matcher.match_components(&a, &b);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].b, 0);
    }

    #[test]
    fn test_exact_preferred_over_fuzzy() {
        let matcher = Matcher::default();
        let a = vec![comp("lodash", "4.17.21")];
        let b = vec![comp("lodash", "4.17.20"), comp("lodash", "4.17.21")];
        let matches = matcher.match_components(&a, &b);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Exact);
        assert_eq!(matches[0].b, 1);
    }

    #[test]
    fn test_order_independence() {
        let matcher = Matcher::default();
        let a = comp("express", "4.18.2").with_purl(Some("pkg:npm/express@4.18.2"));
        let b = comp("express", "4.18.1").with_purl(Some("pkg:npm/express@4.18.1"));
        let ab = matcher.score(&a, &b).unwrap();
        let ba = matcher.score(&b, &a).unwrap();
        assert_eq!(ab.1, ba.1);
        assert_eq!(ab.2, ba.2);
    }

    #[test]
    fn test_match_all_pairs() {
        let mk = |scanner: ScannerId, comps: Vec<Component>| {
            let mut sbom = NormalizedSbom::new(scanner, crate::model::SchemaFamily::CycloneDx);
            sbom.components = comps;
            sbom
        };
        let sboms = vec![
            mk(ScannerId::trivy(), vec![comp("a", "1.0.0")]),
            mk(ScannerId::syft(), vec![comp("a", "1.0.0")]),
            mk(ScannerId::cdxgen(), vec![comp("a", "1.0.1")]),
        ];
        let pairs = Matcher::default().match_all(&sboms);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].exact_count(), 1);
        assert_eq!(pairs[1].fuzzy_count(), 1);
    }
}
