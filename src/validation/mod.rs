//! Batch validation of CPE and PURL identifiers.
//!
//! Validation is two-tier. The syntactic tier never calls out and fails
//! closed. Identifiers that pass it are handed to a [`LookupAuthority`] by a
//! bounded pool of worker threads under an overall batch deadline; answers
//! are cached for the life of the process. A lookup that fails or does not
//! finish in time reports `false` and is listed in
//! [`ValidationReport::unavailable`]; the rest of the batch is unaffected.

mod authority;
mod cache;
#[cfg(feature = "authority")]
mod nvd;
mod rate_limit;
#[cfg(feature = "authority")]
mod registry;
mod syntax;

pub use authority::{LookupAuthority, SyntaxOnlyAuthority};
pub use cache::ValidationCache;
#[cfg(feature = "authority")]
pub use nvd::{NvdConfig, NvdCpeAuthority, NVD_CPE_API};
pub use rate_limit::SlidingWindowLimiter;
#[cfg(feature = "authority")]
pub use registry::{registry_url, RegistryPurlAuthority};
pub use syntax::{is_valid_cpe23, is_valid_purl};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Which identifier grammar a batch uses. Batches are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Cpe,
    Purl,
}

impl IdentifierKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cpe => "cpe",
            Self::Purl => "purl",
        }
    }

    /// Syntactic tier for this kind.
    #[must_use]
    pub fn is_well_formed(&self, identifier: &str) -> bool {
        match self {
            Self::Cpe => is_valid_cpe23(identifier),
            Self::Purl => is_valid_purl(identifier),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency and deadline knobs for batch validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSettings {
    /// Upper bound on concurrent authoritative lookups
    pub max_concurrent: usize,
    /// Deadline for the whole batch
    pub batch_timeout: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            batch_timeout: Duration::from_secs(60),
        }
    }
}

/// Per-identifier outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: BTreeMap<String, bool>,
    /// Identifiers whose authoritative lookup could not complete, with reason
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unavailable: BTreeMap<String, String>,
}

impl ValidationReport {
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.results.values().filter(|v| **v).count()
    }

    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.results.len() - self.valid_count()
    }
}

type LookupOutcome = (String, std::result::Result<bool, String>);

/// Validates batches of identifiers of one kind.
#[derive(Clone)]
pub struct IdentifierValidator {
    authorities: Vec<Arc<dyn LookupAuthority>>,
    cache: Arc<ValidationCache>,
    settings: ValidatorSettings,
}

impl fmt::Debug for IdentifierValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierValidator")
            .field(
                "authorities",
                &self.authorities.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("cached", &self.cache.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for IdentifierValidator {
    fn default() -> Self {
        Self::new(ValidatorSettings::default())
    }
}

impl IdentifierValidator {
    /// Syntax-only validator; add authorities with [`Self::with_authority`].
    #[must_use]
    pub fn new(settings: ValidatorSettings) -> Self {
        Self {
            authorities: Vec::new(),
            cache: Arc::new(ValidationCache::default()),
            settings,
        }
    }

    /// Validator backed by the NVD dictionary and the package registries.
    #[cfg(feature = "authority")]
    pub fn online(
        settings: ValidatorSettings,
        nvd: NvdConfig,
        request_timeout: Duration,
    ) -> crate::error::Result<Self> {
        Ok(Self::new(settings)
            .with_authority(Arc::new(NvdCpeAuthority::new(nvd)?))
            .with_authority(Arc::new(RegistryPurlAuthority::new(request_timeout)?)))
    }

    #[must_use]
    pub fn with_authority(mut self, authority: Arc<dyn LookupAuthority>) -> Self {
        self.authorities.push(authority);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ValidationCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    #[must_use]
    pub const fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    pub fn validate_cpes(&self, cpes: &[String]) -> ValidationReport {
        self.validate(IdentifierKind::Cpe, cpes)
    }

    pub fn validate_purls(&self, purls: &[String]) -> ValidationReport {
        self.validate(IdentifierKind::Purl, purls)
    }

    /// Validate one batch. Never fails as a whole.
    pub fn validate(&self, kind: IdentifierKind, identifiers: &[String]) -> ValidationReport {
        let mut report = ValidationReport::default();
        let authority = self.authorities.iter().find(|a| a.supports(kind)).cloned();

        let mut pending: IndexSet<String> = IndexSet::new();
        for identifier in identifiers {
            if report.results.contains_key(identifier) || pending.contains(identifier) {
                continue;
            }
            if !kind.is_well_formed(identifier) {
                report.results.insert(identifier.clone(), false);
                continue;
            }
            if authority.is_none() {
                report.results.insert(identifier.clone(), true);
                continue;
            }
            match self.cache.get(kind, identifier) {
                Some(valid) => {
                    report.results.insert(identifier.clone(), valid);
                }
                None => {
                    pending.insert(identifier.clone());
                }
            }
        }

        let Some(authority) = authority else {
            return report;
        };
        if pending.is_empty() {
            return report;
        }

        tracing::debug!(
            kind = %kind,
            authority = authority.name(),
            pending = pending.len(),
            "Starting authoritative lookups"
        );
        self.lookup_all(kind, authority, &pending, &mut report);
        report
    }

    fn lookup_all(
        &self,
        kind: IdentifierKind,
        authority: Arc<dyn LookupAuthority>,
        pending: &IndexSet<String>,
        report: &mut ValidationReport,
    ) {
        let queue: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(pending.iter().cloned().collect()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<LookupOutcome>();

        let workers = self.settings.max_concurrent.clamp(1, pending.len());
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let cancelled = Arc::clone(&cancelled);
            let authority = Arc::clone(&authority);
            let cache = Arc::clone(&self.cache);
            let tx = tx.clone();
            std::thread::spawn(move || loop {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let next = queue.lock().expect("queue lock poisoned").pop_front();
                let Some(identifier) = next else {
                    break;
                };
                let outcome = match authority.lookup(kind, &identifier) {
                    Ok(valid) => {
                        cache.put(kind, &identifier, valid);
                        Ok(valid)
                    }
                    Err(e) => Err(e.to_string()),
                };
                if tx.send((identifier, outcome)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.settings.batch_timeout;
        let mut received = 0usize;
        while received < pending.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok((identifier, Ok(valid))) => {
                    received += 1;
                    report.results.insert(identifier, valid);
                }
                Ok((identifier, Err(reason))) => {
                    received += 1;
                    tracing::warn!(identifier = %identifier, reason = %reason, "Validation unavailable");
                    report.results.insert(identifier.clone(), false);
                    report.unavailable.insert(identifier, reason);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        cancelled.store(true, Ordering::Relaxed);

        for identifier in pending {
            if !report.results.contains_key(identifier) {
                let reason = format!(
                    "lookup did not complete within {:?}",
                    self.settings.batch_timeout
                );
                tracing::warn!(identifier = %identifier, reason = %reason, "Validation unavailable");
                report.results.insert(identifier.clone(), false);
                report.unavailable.insert(identifier.clone(), reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReconcileError, Result};

    struct FakeAuthority;

    impl LookupAuthority for FakeAuthority {
        fn name(&self) -> &str {
            "fake"
        }

        fn supports(&self, kind: IdentifierKind) -> bool {
            kind == IdentifierKind::Purl
        }

        fn lookup(&self, _kind: IdentifierKind, identifier: &str) -> Result<bool> {
            if identifier.contains("flaky") {
                return Err(ReconcileError::validation_unavailable(identifier, "connection reset"));
            }
            Ok(!identifier.contains("missing"))
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_syntax_only_batch() {
        let validator = IdentifierValidator::default();
        let report = validator.validate_cpes(&ids(&[
            "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*:*",
            "not-a-cpe",
        ]));
        assert_eq!(report.valid_count(), 1);
        assert_eq!(report.results["not-a-cpe"], false);
        assert!(report.unavailable.is_empty());
    }

    #[test]
    fn test_authority_answers_and_unavailable() {
        let validator = IdentifierValidator::default().with_authority(Arc::new(FakeAuthority));
        let report = validator.validate_purls(&ids(&[
            "pkg:npm/lodash@4.17.21",
            "pkg:npm/missing@1.0.0",
            "pkg:npm/flaky@1.0.0",
            "garbage",
        ]));
        assert_eq!(report.results["pkg:npm/lodash@4.17.21"], true);
        assert_eq!(report.results["pkg:npm/missing@1.0.0"], false);
        assert_eq!(report.results["pkg:npm/flaky@1.0.0"], false);
        assert_eq!(report.results["garbage"], false);
        assert_eq!(report.unavailable.len(), 1);
        assert!(report.unavailable.contains_key("pkg:npm/flaky@1.0.0"));
    }

    #[test]
    fn test_answers_are_cached_but_failures_are_not() {
        let validator = IdentifierValidator::default().with_authority(Arc::new(FakeAuthority));
        validator.validate_purls(&ids(&["pkg:npm/lodash@4.17.21", "pkg:npm/flaky@1.0.0"]));
        assert_eq!(
            validator.cache().get(IdentifierKind::Purl, "pkg:npm/lodash@4.17.21"),
            Some(true)
        );
        assert_eq!(
            validator.cache().get(IdentifierKind::Purl, "pkg:npm/flaky@1.0.0"),
            None
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let validator = IdentifierValidator::default();
        let report = validator.validate_purls(&ids(&["pkg:npm/a@1", "pkg:npm/a@1"]));
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn test_cpe_batch_falls_back_to_syntax_without_cpe_authority() {
        let validator = IdentifierValidator::default().with_authority(Arc::new(FakeAuthority));
        let report = validator.validate_cpes(&ids(&["cpe:2.3:a:x:y:1.0:*:*:*:*:*:*:*"]));
        assert_eq!(report.valid_count(), 1);
    }
}
