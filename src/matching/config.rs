//! Cross-scanner matching policy.
//!
//! The weights and thresholds are a tunable starting policy, not a contract.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Weights applied to the per-field similarity scores.
///
/// Fields missing on either side are dropped and the remaining weights are
/// renormalized, so the weights need not sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FieldWeights {
    pub name: f64,
    pub version: f64,
    pub purl: f64,
    pub cpe: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: 0.4,
            version: 0.3,
            purl: 0.2,
            cpe: 0.1,
        }
    }
}

impl FieldWeights {
    /// Check if weights sum to ~1.0.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        ((self.name + self.version + self.purl + self.cpe) - 1.0).abs() < 0.001
    }

    fn all_non_negative(&self) -> bool {
        [self.name, self.version, self.purl, self.cpe]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Thresholds deciding when a scored pair is reported as a fuzzy match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MatchPolicy {
    pub weights: FieldWeights,
    /// Minimum combined score for a fuzzy match
    pub min_combined_score: f64,
    /// Name score gate; identical versions alone never make a match
    pub min_name_score: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl MatchPolicy {
    /// Fewer, higher-confidence fuzzy matches
    #[must_use]
    pub fn strict() -> Self {
        Self {
            weights: FieldWeights::default(),
            min_combined_score: 0.75,
            min_name_score: 0.7,
        }
    }

    #[must_use]
    pub fn balanced() -> Self {
        Self {
            weights: FieldWeights::default(),
            min_combined_score: 0.6,
            min_name_score: 0.5,
        }
    }

    /// More fuzzy matches, more noise
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            weights: FieldWeights::default(),
            min_combined_score: 0.5,
            min_name_score: 0.4,
        }
    }

    /// Create a policy from a preset name.
    #[must_use]
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "strict" => Some(Self::strict()),
            "balanced" | "default" => Some(Self::balanced()),
            "permissive" => Some(Self::permissive()),
            _ => None,
        }
    }

    /// Set the combined-score threshold.
    #[must_use]
    pub const fn with_min_combined_score(mut self, threshold: f64) -> Self {
        self.min_combined_score = threshold;
        self
    }

    /// Problems with this policy, empty when valid.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.weights.all_non_negative() {
            problems.push("field weights must be finite and non-negative".to_string());
        } else if self.weights.name <= 0.0 {
            problems.push("name weight must be positive".to_string());
        }
        for (field, value) in [
            ("min_combined_score", self.min_combined_score),
            ("min_name_score", self.min_name_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{field} must be between 0.0 and 1.0, got {value}"));
            }
        }
        problems
    }
}
