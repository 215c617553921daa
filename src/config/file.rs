//! YAML config files: where to find them and how to read them.
//!
//! An explicit `--config` path is used as given. Otherwise the first of
//! [`CONFIG_FILE_NAMES`] found in the working directory, the enclosing git
//! checkout, the user config directory or the home directory wins.

use super::types::AppConfig;
use std::path::{Path, PathBuf};

/// File names probed in every search directory, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".sbom-reconcile.yaml",
    ".sbom-reconcile.yml",
    "sbom-reconcile.yaml",
    "sbom-reconcile.yml",
];

/// Locate the config file to load, if any.
#[must_use]
pub fn discover_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("Config file {} does not exist, searching defaults", path.display());
    }

    search_dirs().iter().find_map(|dir| probe(dir))
}

fn search_dirs() -> Vec<PathBuf> {
    let cwd = std::env::current_dir().ok();
    let git_root = cwd.as_deref().and_then(enclosing_checkout);
    [
        cwd,
        git_root,
        dirs::config_dir().map(|d| d.join("sbom-reconcile")),
        dirs::home_dir(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn probe(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Closest ancestor of `start` holding a `.git` entry.
fn enclosing_checkout(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Errors reading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Parse one YAML config file. Missing sections take their defaults.
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigFileError> {
    if !path.exists() {
        return Err(ConfigFileError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// The discovered config, or defaults when there is none or it is unreadable.
///
/// The second element is the file the config came from.
#[must_use]
pub fn load_or_default(explicit_path: Option<&Path>) -> (AppConfig, Option<PathBuf>) {
    let Some(path) = discover_config_file(explicit_path) else {
        return (AppConfig::default(), None);
    };
    match load_config_file(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            tracing::warn!("Ignoring config {}: {}", path.display(), e);
            (AppConfig::default(), None)
        }
    }
}

/// Commented YAML rendering of the default config.
#[must_use]
pub fn generate_example_config() -> String {
    format!(
        "# sbom-reconcile configuration\n\
         # Save as .sbom-reconcile.yaml in the project root or ~/.config/sbom-reconcile/\n\n{}",
        serde_yaml::to_string(&AppConfig::default()).unwrap_or_default()
    )
}
