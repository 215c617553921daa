//! Request and response bodies of the scan API.
//!
//! Field names follow the JSON contract (`snake_case`) so these types can be
//! handed straight to an HTTP layer.

use crate::merge::{MergeOptions, UniqueSelection};
use crate::model::ScanStatus;
use crate::validation::ValidationReport;
use serde::{Deserialize, Serialize};

/// `POST scan/upload-repository`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRepositoryRequest {
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
}

impl UploadRepositoryRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            github_token: None,
        }
    }
}

/// Reply to an accepted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub scan_id: String,
    pub status: ScanStatus,
    pub message: String,
}

/// `GET scan/scan-status/{scanId}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    pub status: ScanStatus,
}

/// `POST scan/rerun-scanner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunRequest {
    pub scan_id: String,
    pub scanner: String,
    /// Shell commands run in the checkout before the scanner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

/// `POST scan/merge-sbom/{scanId}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub selected_unique_packages: UniqueSelection,
    #[serde(flatten)]
    pub options: MergeOptions,
}

/// `POST scan/validate-cpes`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCpesRequest {
    pub cpes: Vec<String>,
}

/// `POST scan/purl-validate`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatePurlsRequest {
    pub purls: Vec<String>,
}

/// `{results: {identifier: bool}}`, plus the identifiers whose lookup did not finish.
pub type ValidationResponse = ValidationReport;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScannerId;

    #[test]
    fn test_merge_request_wire_format() {
        let request: MergeRequest = serde_json::from_str(
            r#"{
                "selected_unique_packages": {"trivy": [{"name": "zlib", "version": "1.3"}]},
                "exclude_github_actions": true
            }"#,
        )
        .unwrap();
        assert_eq!(request.selected_unique_packages[&ScannerId::trivy()].len(), 1);
        assert!(request.options.exclude_github_actions);
        assert!(!request.options.include_all_unique);

        let empty: MergeRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.selected_unique_packages.is_empty());
    }

    #[test]
    fn test_upload_request_token_optional() {
        let request: UploadRepositoryRequest =
            serde_json::from_str(r#"{"repo_url": "https://github.com/o/r"}"#).unwrap();
        assert_eq!(request, UploadRepositoryRequest::new("https://github.com/o/r"));
    }
}
