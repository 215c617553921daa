//! Boundary to the processes that acquire repositories and run scanners.

mod command;
pub mod github;

pub use command::CommandInvoker;

use crate::error::{ReconcileError, Result};
use crate::model::ScannerSpec;
use std::path::{Path, PathBuf};

/// Executes repository checkouts and scanner runs.
///
/// Implementations block; the lifecycle calls them from worker threads and
/// enforces per-scanner deadlines on top of whatever the implementation does.
pub trait ProcessInvoker: Send + Sync {
    /// Check `url` out into `dest`, returning the repository root.
    fn clone_repository(&self, url: &str, token: Option<&str>, dest: &Path) -> Result<PathBuf>;

    /// Run `commands` in `repo` (in order), then the scanner, and return its
    /// raw JSON output.
    fn run_scanner(
        &self,
        spec: &ScannerSpec,
        repo: &Path,
        commands: &[String],
    ) -> Result<serde_json::Value>;

    /// Fetch the SBOM of a scanner whose source is a remote service rather
    /// than a command.
    fn fetch_sbom(
        &self,
        spec: &ScannerSpec,
        _repo_url: &str,
        _token: Option<&str>,
    ) -> Result<serde_json::Value> {
        Err(ReconcileError::scanner_execution(
            spec.id.as_str(),
            format!("{} sources are not supported", spec.source),
        ))
    }
}

/// Clone URL with the token embedded for HTTPS remotes.
#[must_use]
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match (token, url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !token.is_empty() => format!("https://{token}@{rest}"),
        _ => url.to_string(),
    }
}
