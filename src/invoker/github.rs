//! GitHub dependency-graph SBOM export.

use crate::error::{ReconcileError, Result};
#[cfg(feature = "authority")]
use std::time::Duration;

/// Public GitHub REST API.
pub const GITHUB_API: &str = "https://api.github.com";

#[cfg(feature = "authority")]
const API_VERSION: &str = "2022-11-28";

/// `(owner, repo)` of a GitHub remote.
///
/// Accepts `https://github.com/owner/repo`, with or without a trailing
/// `.git` or `/`, and the `git@github.com:owner/repo.git` form.
#[must_use]
pub fn parse_repo_slug(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/')?.1,
        None => url.split_once(':')?.1,
    };
    let mut parts = path.rsplit('/');
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repo.to_string()))
}

/// Dependency-graph SBOM endpoint of a repository.
pub fn dependency_graph_url(api_base: &str, repo_url: &str) -> Result<String> {
    let (owner, repo) = parse_repo_slug(repo_url).ok_or_else(|| {
        ReconcileError::RepositoryAcquisition {
            url: repo_url.to_string(),
            message: "not a GitHub repository URL".to_string(),
        }
    })?;
    Ok(format!(
        "{}/repos/{owner}/{repo}/dependency-graph/sbom",
        api_base.trim_end_matches('/')
    ))
}

/// Fetch the SPDX export GitHub builds from the repository's dependency
/// graph. The response keeps GitHub's `{"sbom": ...}` envelope.
#[cfg(feature = "authority")]
pub fn fetch_dependency_graph_sbom(
    api_base: &str,
    repo_url: &str,
    token: Option<&str>,
    timeout: Duration,
) -> Result<serde_json::Value> {
    let url = dependency_graph_url(api_base, repo_url)?;
    let failed = |message: String| ReconcileError::RepositoryAcquisition {
        url: repo_url.to_string(),
        message,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ReconcileError::config(format!("Failed to create HTTP client: {e}")))?;
    let mut request = client
        .get(&url)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", API_VERSION);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        request = request.bearer_auth(token);
    }

    tracing::info!(url = %url, "Fetching dependency-graph SBOM");
    let response = request.send().map_err(|e| failed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("GitHub returned status {}", status.as_u16())));
    }
    response
        .json()
        .map_err(|e| failed(format!("bad GitHub response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_slug() {
        for url in [
            "https://github.com/example/app",
            "https://github.com/example/app.git",
            "https://github.com/example/app/",
            "git@github.com:example/app.git",
        ] {
            assert_eq!(
                parse_repo_slug(url),
                Some(("example".to_string(), "app".to_string())),
                "{url}"
            );
        }
        assert_eq!(parse_repo_slug("https://github.com/"), None);
        assert_eq!(parse_repo_slug("app"), None);
    }

    #[test]
    fn test_dependency_graph_url() {
        assert_eq!(
            dependency_graph_url(GITHUB_API, "https://github.com/example/app.git").unwrap(),
            "https://api.github.com/repos/example/app/dependency-graph/sbom"
        );
        assert!(dependency_graph_url(GITHUB_API, "/tmp/app").is_err());
    }
}
