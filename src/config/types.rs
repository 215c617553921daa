//! Configuration types for sbom-reconcile.

use super::defaults::{
    DEFAULT_BATCH_TIMEOUT_SECS, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_MATCHING_PRESET,
    DEFAULT_MAX_CONCURRENT, DEFAULT_REQUEST_TIMEOUT_SECS, NVD_API_KEY_ENV,
};
use crate::matching::{FieldWeights, MatchPolicy};
use crate::model::{ScannerRegistry, ScannerSpec};
use crate::validation::ValidatorSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Unified Application Configuration
// ============================================================================

/// Top-level configuration, loaded from a config file and layered with CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AppConfig {
    /// Fuzzy matching policy
    pub matching: MatchingConfig,
    /// Scanner registry, in dispatch order
    pub scanners: Vec<ScannerSpec>,
    /// Identifier validation
    pub validation: ValidationConfig,
    /// Scan lifecycle
    pub lifecycle: LifecycleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            scanners: ScannerRegistry::default_specs(),
            validation: ValidationConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an `AppConfig` builder.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Scanner registry described by `scanners`.
    #[must_use]
    pub fn registry(&self) -> ScannerRegistry {
        ScannerRegistry::from_specs(self.scanners.iter().cloned())
    }
}

// ============================================================================
// Builder for AppConfig
// ============================================================================

/// Builder for constructing `AppConfig` with fluent API.
#[derive(Debug, Default)]
#[must_use]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the fuzzy matching preset.
    pub fn matching_preset(mut self, preset: impl Into<String>) -> Self {
        self.config.matching.preset = preset.into();
        self
    }

    /// Override the preset's combined-score threshold.
    pub const fn min_combined_score(mut self, threshold: f64) -> Self {
        self.config.matching.min_combined_score = Some(threshold);
        self
    }

    /// Replace the scanner table.
    pub fn scanners(mut self, scanners: Vec<ScannerSpec>) -> Self {
        self.config.scanners = scanners;
        self
    }

    /// Skip authoritative lookups.
    pub const fn offline(mut self, offline: bool) -> Self {
        self.config.validation.offline = offline;
        self
    }

    /// Directory for repository checkouts.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.lifecycle.work_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn build(self) -> AppConfig {
        self.config
    }
}

// ============================================================================
// Matching Configuration
// ============================================================================

/// Fuzzy matching configuration: a named preset plus optional overrides.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MatchingConfig {
    /// Preset name: strict, balanced, permissive
    pub preset: String,
    /// Field weights, overriding the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<FieldWeights>,
    /// Combined-score threshold (0.0-1.0), overriding the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_combined_score: Option<f64>,
    /// Name-score gate (0.0-1.0), overriding the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_name_score: Option<f64>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            preset: DEFAULT_MATCHING_PRESET.to_string(),
            weights: None,
            min_combined_score: None,
            min_name_score: None,
        }
    }
}

impl MatchingConfig {
    /// Resolve the preset and apply the overrides. Unknown presets fall back
    /// to `balanced`; validation reports them.
    #[must_use]
    pub fn policy(&self) -> MatchPolicy {
        let mut policy = MatchPolicy::from_preset(&self.preset).unwrap_or_default();
        if let Some(weights) = self.weights {
            policy.weights = weights;
        }
        if let Some(threshold) = self.min_combined_score {
            policy.min_combined_score = threshold;
        }
        if let Some(threshold) = self.min_name_score {
            policy.min_name_score = threshold;
        }
        policy
    }
}

// ============================================================================
// Validation Configuration
// ============================================================================

/// Identifier validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum concurrent authoritative lookups per batch
    pub max_concurrent: usize,
    /// Deadline for one batch in seconds
    pub batch_timeout_secs: u64,
    /// Timeout of a single HTTP lookup in seconds
    pub request_timeout_secs: u64,
    /// Capacity of the process-wide lookup cache
    pub cache_max_entries: usize,
    /// NVD CPE API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nvd_api_base: Option<String>,
    /// NVD API key (falls back to the `NVD_API_KEY` environment variable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nvd_api_key: Option<String>,
    /// Syntax checks only, no network lookups
    pub offline: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            batch_timeout_secs: DEFAULT_BATCH_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            nvd_api_base: None,
            nvd_api_key: None,
            offline: false,
        }
    }
}

impl ValidationConfig {
    #[must_use]
    pub fn settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            max_concurrent: self.max_concurrent.max(1),
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured key, else the environment.
    #[must_use]
    pub fn resolved_nvd_api_key(&self) -> Option<String> {
        self.nvd_api_key
            .clone()
            .or_else(|| std::env::var(NVD_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

// ============================================================================
// Lifecycle Configuration
// ============================================================================

/// Scan lifecycle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Parent directory for repository checkouts (defaults to the system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl LifecycleConfig {
    #[must_use]
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("sbom-reconcile"))
    }
}
