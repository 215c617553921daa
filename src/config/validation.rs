//! Configuration validation.

use super::defaults::MATCHING_PRESETS;
use super::types::{AppConfig, LifecycleConfig, MatchingConfig, ValidationConfig};
use crate::model::ScannerSource;
use std::collections::HashSet;

/// One invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The field that failed validation
    pub field: String,
    /// Description of the validation error
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Trait for validatable configuration types.
pub trait Validatable {
    /// Validate the configuration, returning any errors found.
    fn validate(&self) -> Vec<ConfigError>;

    /// Check if the configuration is valid.
    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

impl Validatable for AppConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.matching.validate());
        errors.extend(self.validation.validate());
        errors.extend(self.lifecycle.validate());

        if self.scanners.is_empty() {
            errors.push(ConfigError::new("scanners", "at least one scanner is required"));
        }
        let mut seen = HashSet::new();
        for (i, spec) in self.scanners.iter().enumerate() {
            if !seen.insert(spec.id.clone()) {
                errors.push(ConfigError::new(
                    format!("scanners[{i}].id"),
                    format!("duplicate scanner '{}'", spec.id),
                ));
            }
            match spec.source {
                ScannerSource::Command if spec.command.is_empty() => {
                    errors.push(ConfigError::new(
                        format!("scanners[{i}].command"),
                        "command must not be empty",
                    ));
                }
                ScannerSource::Command
                    if !spec.command.iter().any(|arg| arg.contains("{output}")) =>
                {
                    errors.push(ConfigError::new(
                        format!("scanners[{i}].command"),
                        "command must contain the {output} placeholder",
                    ));
                }
                ScannerSource::Command => {}
                source if !spec.command.is_empty() => {
                    errors.push(ConfigError::new(
                        format!("scanners[{i}].command"),
                        format!("{source} scanners take no command"),
                    ));
                }
                _ => {}
            }
            if spec.timeout_secs == 0 {
                errors.push(ConfigError::new(
                    format!("scanners[{i}].timeout_secs"),
                    "timeout must be positive",
                ));
            }
        }
        errors
    }
}

impl Validatable for MatchingConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !MATCHING_PRESETS.contains(&self.preset.to_lowercase().as_str()) {
            errors.push(ConfigError::new(
                "matching.preset",
                format!(
                    "Invalid preset '{}'. Valid options: {}",
                    self.preset,
                    MATCHING_PRESETS.join(", ")
                ),
            ));
        }
        errors.extend(
            self.policy()
                .problems()
                .into_iter()
                .map(|message| ConfigError::new("matching", message)),
        );
        errors
    }
}

impl Validatable for ValidationConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.max_concurrent == 0 || self.max_concurrent > 64 {
            errors.push(ConfigError::new(
                "validation.max_concurrent",
                format!("must be between 1 and 64, got {}", self.max_concurrent),
            ));
        }
        if self.batch_timeout_secs == 0 {
            errors.push(ConfigError::new("validation.batch_timeout_secs", "must be positive"));
        }
        if self.request_timeout_secs == 0 {
            errors.push(ConfigError::new("validation.request_timeout_secs", "must be positive"));
        }
        if self.cache_max_entries == 0 {
            errors.push(ConfigError::new("validation.cache_max_entries", "must be positive"));
        }
        if let Some(base) = &self.nvd_api_base {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                errors.push(ConfigError::new(
                    "validation.nvd_api_base",
                    format!("'{base}' is not an http(s) URL"),
                ));
            }
        }
        errors
    }
}

impl Validatable for LifecycleConfig {
    fn validate(&self) -> Vec<ConfigError> {
        match &self.work_dir {
            Some(dir) if dir.as_os_str().is_empty() => {
                vec![ConfigError::new("lifecycle.work_dir", "must not be empty")]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScannerId, ScannerSpec, SchemaFamily};

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().is_valid());
    }

    #[test]
    fn test_invalid_preset() {
        let config = MatchingConfig {
            preset: "security-focused".to_string(),
            ..MatchingConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "matching.preset");
    }

    #[test]
    fn test_out_of_range_threshold() {
        let config = MatchingConfig {
            min_combined_score: Some(1.5),
            ..MatchingConfig::default()
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn test_scanner_table_problems() {
        let spec = ScannerSpec::new(ScannerId::new("x"), &["x", "{repo}"], SchemaFamily::Auto);
        let config = AppConfig {
            scanners: vec![spec.clone(), spec],
            ..AppConfig::default()
        };
        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"scanners[1].id".to_string()));
        assert!(fields.contains(&"scanners[0].command".to_string()));
    }

    #[test]
    fn test_fetch_scanner_row() {
        let mut config = AppConfig::default();
        config
            .scanners
            .push(ScannerSpec::github_dependency_graph(ScannerId::ghas()));
        assert!(config.is_valid());

        let mut with_command = ScannerSpec::github_dependency_graph(ScannerId::ghas());
        with_command.command = vec!["gh".to_string()];
        config.scanners = vec![with_command];
        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["scanners[0].command".to_string()]);
    }
}
