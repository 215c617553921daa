//! Version similarity and combined scoring.

use super::config::FieldWeights;
use crate::model::strip_build_metadata;
use serde::{Deserialize, Serialize};

/// Score when versions differ only in build metadata.
const BUILD_ONLY_SCORE: f64 = 0.9;
/// Score when versions share a core and differ in pre-release.
const PRERELEASE_ONLY_SCORE: f64 = 0.8;
/// Same major.minor, one patch apart; each further step costs `PATCH_STEP`.
const PATCH_BASE: f64 = 0.75;
const PATCH_STEP: f64 = 0.04;
const PATCH_FLOOR: f64 = 0.55;
/// Same major, one minor apart; each further step costs `MINOR_STEP`.
const MINOR_BASE: f64 = 0.5;
const MINOR_STEP: f64 = 0.05;
/// Below this the versions are not considered close.
const MINOR_FLOOR: f64 = 0.3;

/// Parse a version string into semver components (major, minor, patch).
///
/// Strict semver first; otherwise a lenient split where a leading `v`/`V` is
/// ignored and missing minor/patch parts default to 0.
#[must_use]
pub fn parse_semver_parts(version: &str) -> Option<(u32, u32, u32)> {
    let version = version.trim_start_matches(['v', 'V']);
    if let Ok(strict) = semver::Version::parse(version) {
        return Some((
            u32::try_from(strict.major).ok()?,
            u32::try_from(strict.minor).ok()?,
            u32::try_from(strict.patch).ok()?,
        ));
    }

    let mut parts = version.split(['.', '-', '+']);

    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    Some((major, minor, patch))
}

/// Version with pre-release and build suffixes removed.
fn version_core(version: &str) -> &str {
    let core = strip_build_metadata(version);
    core.split_once('-').map_or(core, |(c, _)| c)
}

/// Version similarity in `[0, 1]`.
///
/// - identical: 1.0
/// - differing only in build metadata: 0.9
/// - differing only in pre-release: 0.8
/// - same major.minor: 0.75 down to 0.55 by patch distance
/// - same major: 0.5 down to 0.3 by minor distance, then 0
/// - otherwise: 0
#[must_use]
pub fn version_similarity(version_a: &str, version_b: &str) -> f64 {
    let (a, b) = (version_a.trim(), version_b.trim());
    if a == b {
        return 1.0;
    }
    if strip_build_metadata(a) == strip_build_metadata(b) {
        return BUILD_ONLY_SCORE;
    }
    let (core_a, core_b) = (version_core(a), version_core(b));
    if !core_a.is_empty() && core_a == core_b {
        return PRERELEASE_ONLY_SCORE;
    }

    let (Some((maj_a, min_a, patch_a)), Some((maj_b, min_b, patch_b))) =
        (parse_semver_parts(core_a), parse_semver_parts(core_b))
    else {
        return 0.0;
    };

    if maj_a != maj_b {
        return 0.0;
    }
    if min_a == min_b {
        let patch_diff = patch_a.abs_diff(patch_b);
        if patch_diff == 0 {
            // "1.2" vs "1.2.0"
            return PRERELEASE_ONLY_SCORE;
        }
        return f64::from(patch_diff - 1)
            .mul_add(-PATCH_STEP, PATCH_BASE)
            .max(PATCH_FLOOR);
    }

    let minor_diff = min_a.abs_diff(min_b);
    let score = f64::from(minor_diff - 1).mul_add(-MINOR_STEP, MINOR_BASE);
    if score < MINOR_FLOOR - f64::EPSILON {
        0.0
    } else {
        score
    }
}

/// Per-field similarity scores for one component pair.
///
/// `purl` and `cpe` are `None` when either side lacks the identifier; such
/// fields are excluded from the combined score rather than counted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldScores {
    pub name: f64,
    pub version: f64,
    pub purl: Option<f64>,
    pub cpe: Option<f64>,
}

impl FieldScores {
    /// Scores for an exact match.
    #[must_use]
    pub const fn exact() -> Self {
        Self {
            name: 1.0,
            version: 1.0,
            purl: Some(1.0),
            cpe: Some(1.0),
        }
    }

    /// Weighted mean over the fields that are present.
    #[must_use]
    pub fn combined(&self, weights: &FieldWeights) -> f64 {
        let mut total = weights.name * self.name + weights.version * self.version;
        let mut weight_sum = weights.name + weights.version;
        if let Some(purl) = self.purl {
            total += weights.purl * purl;
            weight_sum += weights.purl;
        }
        if let Some(cpe) = self.cpe {
            total += weights.cpe * cpe;
            weight_sum += weights.cpe;
        }
        if weight_sum > 0.0 {
            (total / weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semver_parts() {
        assert_eq!(parse_semver_parts("v1.2.3"), Some((1, 2, 3)));
        assert_eq!(parse_semver_parts("2"), Some((2, 0, 0)));
        assert_eq!(parse_semver_parts("abc"), None);
    }

    #[test]
    fn test_version_similarity_tiers() {
        assert_eq!(version_similarity("4.17.21", "4.17.21"), 1.0);
        assert_eq!(version_similarity("1.0.0+build.1", "1.0.0+build.2"), 0.9);
        assert_eq!(version_similarity("1.0.0-rc.1", "1.0.0"), 0.8);

        let patch = version_similarity("4.17.21", "4.17.20");
        assert!((0.3..=0.8).contains(&patch));
        assert!(patch > version_similarity("4.17.21", "4.17.10"));

        let minor = version_similarity("4.17.21", "4.16.0");
        assert!((0.3..=0.8).contains(&minor));
        assert!(patch > minor);

        assert_eq!(version_similarity("4.1.0", "4.17.0"), 0.0);
        assert_eq!(version_similarity("1.0.0", "2.0.0"), 0.0);
        assert_eq!(version_similarity("abc", "def"), 0.0);
    }

    #[test]
    fn test_version_similarity_symmetric() {
        for (a, b) in [("1.2.3", "1.2.9"), ("1.0.0-beta", "1.0.0"), ("1.2", "1.4.1")] {
            assert_eq!(version_similarity(a, b), version_similarity(b, a));
        }
    }

    #[test]
    fn test_combined_renormalizes_missing_fields() {
        let weights = FieldWeights::default();
        let scores = FieldScores {
            name: 1.0,
            version: 0.5,
            purl: None,
            cpe: None,
        };
        let expected = (0.4 * 1.0 + 0.3 * 0.5) / 0.7;
        assert!((scores.combined(&weights) - expected).abs() < 1e-9);
        assert_eq!(FieldScores::exact().combined(&weights), 1.0);
    }
}
