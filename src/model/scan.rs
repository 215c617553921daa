//! Scan records and per-scanner results.

use super::ScannerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Lifecycle status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states only move again through a rerun.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one scanner run. A result with an error never carries a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbomResult {
    pub scanner: ScannerId,
    pub sbom: Option<serde_json::Value>,
    pub component_count: usize,
    pub error: Option<String>,
    pub rerun: bool,
}

impl SbomResult {
    /// Successful run with its raw document and normalized component count.
    #[must_use]
    pub fn success(scanner: ScannerId, sbom: serde_json::Value, component_count: usize) -> Self {
        Self {
            scanner,
            sbom: Some(sbom),
            component_count,
            error: None,
            rerun: false,
        }
    }

    /// Failed run; the document is dropped.
    pub fn failure(scanner: ScannerId, error: impl Into<String>) -> Self {
        Self {
            scanner,
            sbom: None,
            component_count: 0,
            error: Some(error.into()),
            rerun: false,
        }
    }

    /// Placeholder for a scanner whose rerun is in flight.
    #[must_use]
    pub fn pending_rerun(scanner: ScannerId) -> Self {
        Self {
            scanner,
            sbom: None,
            component_count: 0,
            error: None,
            rerun: true,
        }
    }

    #[must_use]
    pub const fn with_rerun(mut self, rerun: bool) -> Self {
        self.rerun = rerun;
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none() && self.sbom.is_some()
    }
}

/// The source of truth for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub repo_url: String,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: BTreeMap<ScannerId, SbomResult>,
    pub tech_stack: BTreeSet<String>,
    /// Scanners currently executing (initial run or rerun)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub running_scanners: BTreeSet<ScannerId>,
    /// Scan-level failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanRecord {
    /// New pending record.
    pub fn new(scan_id: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            repo_url: repo_url.into(),
            status: ScanStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            results: BTreeMap::new(),
            tech_stack: BTreeSet::new(),
            running_scanners: BTreeSet::new(),
            error: None,
        }
    }

    /// Record tech-stack tags, lower-cased.
    pub fn add_tech_stack<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tech_stack.extend(
            tags.into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        );
    }

    /// Whether a given scanner is currently running.
    #[must_use]
    pub fn is_running(&self, scanner: &ScannerId) -> bool {
        self.running_scanners.contains(scanner)
    }

    /// Successful results only, in scanner order.
    pub fn successful_results(&self) -> impl Iterator<Item = &SbomResult> {
        self.results.values().filter(|r| r.is_success())
    }

    /// Hash over everything derived outputs depend on.
    ///
    /// Changes whenever any `SbomResult` changes, so it doubles as the cache
    /// key for analysis, graph and merge results.
    #[must_use]
    pub fn inputs_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for (scanner, result) in &self.results {
            hasher.update(scanner.as_str().as_bytes());
            hasher.update(&[0]);
            if let Some(sbom) = &result.sbom {
                hasher.update(sbom.to_string().as_bytes());
            }
            hasher.update(&[0]);
            if let Some(error) = &result.error {
                hasher.update(error.as_bytes());
            }
            hasher.update(&[u8::from(result.rerun)]);
        }
        for tag in &self.tech_stack {
            hasher.update(tag.as_bytes());
            hasher.update(&[0]);
        }
        hasher.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Pending.is_terminal());
    }

    #[test]
    fn test_failure_drops_document() {
        let result = SbomResult::failure(ScannerId::trivy(), "exit status 1");
        assert!(result.sbom.is_none());
        assert!(!result.is_success());
    }

    #[test]
    fn test_inputs_hash_tracks_results() {
        let mut record = ScanRecord::new("s1", "https://github.com/o/r");
        let empty = record.inputs_hash();

        record.results.insert(
            ScannerId::syft(),
            SbomResult::success(ScannerId::syft(), json!({"bomFormat": "CycloneDX"}), 0),
        );
        let one = record.inputs_hash();
        assert_ne!(empty, one);
        assert_eq!(one, record.clone().inputs_hash());

        record
            .results
            .insert(ScannerId::syft(), SbomResult::failure(ScannerId::syft(), "boom"));
        assert_ne!(one, record.inputs_hash());
    }

    #[test]
    fn test_tech_stack_lowercased() {
        let mut record = ScanRecord::new("s1", "u");
        record.add_tech_stack(["NodeJS", "nodejs", " Python "]);
        assert_eq!(record.tech_stack.len(), 2);
        assert!(record.tech_stack.contains("python"));
    }
}
