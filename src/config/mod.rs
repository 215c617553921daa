//! Configuration for sbom-reconcile.
//!
//! - Type-safe configuration structures with defaults
//! - Validation of every section
//! - YAML config file loading and discovery
//! - JSON schema generation
//!
//! # Configuration File
//!
//! Place a `.sbom-reconcile.yaml` file in your project root or
//! `~/.config/sbom-reconcile/`:
//!
//! ```yaml
//! matching:
//!   preset: strict
//! validation:
//!   offline: true
//! scanners:
//!   - id: trivy
//!     command: [trivy, fs, --format, cyclonedx, --output, "{output}", "{repo}"]
//!     timeout_secs: 600
//! ```

mod defaults;
pub mod file;
mod types;
mod validation;

pub use defaults::{
    DEFAULT_BATCH_TIMEOUT_SECS, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_MAX_CONCURRENT,
    DEFAULT_REQUEST_TIMEOUT_SECS, MATCHING_PRESETS, NVD_API_KEY_ENV,
};
pub use types::{AppConfig, AppConfigBuilder, LifecycleConfig, MatchingConfig, ValidationConfig};
pub use validation::{ConfigError, Validatable};

pub use file::{
    discover_config_file, generate_example_config, load_config_file, load_or_default,
    ConfigFileError,
};

/// JSON Schema of the config file format, for editor validation and completion.
#[must_use]
pub fn generate_json_schema() -> String {
    let schema = schemars::schema_for!(AppConfig);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}
