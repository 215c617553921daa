//! Batch identifier validation against scripted lookup authorities.

use sbom_reconcile::{
    error::ReconcileError,
    validation::{LookupAuthority, ValidationCache, ValidatorSettings},
    IdentifierKind, IdentifierValidator,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Answers every identifier as valid after `delay`, except those containing
/// `missing`. Identifiers containing `hang` take `hang_for`.
struct RecordingAuthority {
    delay: Duration,
    hang_for: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingAuthority {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            hang_for: Duration::from_secs(5),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LookupAuthority for RecordingAuthority {
    fn name(&self) -> &str {
        "recording"
    }

    fn supports(&self, _kind: IdentifierKind) -> bool {
        true
    }

    fn lookup(&self, _kind: IdentifierKind, identifier: &str) -> sbom_reconcile::Result<bool> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(identifier.to_string());

        if identifier.contains("hang") {
            thread::sleep(self.hang_for);
        } else {
            thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if identifier.contains("offline") {
            return Err(ReconcileError::validation_unavailable(identifier, "HTTP 503"));
        }
        Ok(!identifier.contains("missing"))
    }
}

fn settings(max_concurrent: usize, batch_timeout: Duration) -> ValidatorSettings {
    ValidatorSettings {
        max_concurrent,
        batch_timeout,
    }
}

fn purls(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("pkg:npm/package-{i}@1.0.{i}"))
        .collect()
}

#[test]
fn test_one_malformed_purl_among_valid_ones() {
    let authority = Arc::new(RecordingAuthority::new(Duration::from_millis(5)));
    let validator = IdentifierValidator::new(settings(4, Duration::from_secs(10)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>);

    let mut batch = purls(9);
    batch.insert(4, "npm/left-pad@1.3.0".to_string());
    let report = validator.validate_purls(&batch);

    assert_eq!(report.results.len(), 10);
    assert_eq!(report.invalid_count(), 1);
    assert_eq!(report.results["npm/left-pad@1.3.0"], false);
    assert!(report.unavailable.is_empty());
    // The malformed one never reaches the authority.
    assert_eq!(authority.call_count(), 9);
}

#[test]
fn test_one_malformed_cpe_among_valid_ones() {
    let authority = Arc::new(RecordingAuthority::new(Duration::ZERO));
    let validator = IdentifierValidator::new(settings(4, Duration::from_secs(10)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>);

    let mut batch: Vec<String> = (0..9)
        .map(|i| format!("cpe:2.3:a:vendor{i}:product{i}:1.{i}:*:*:*:*:*:*:*"))
        .collect();
    batch.push("cpe:/a:apache:log4j:2.14.1".to_string());
    let report = validator.validate_cpes(&batch);

    assert_eq!(report.valid_count(), 9);
    assert_eq!(report.results["cpe:/a:apache:log4j:2.14.1"], false);
}

#[test]
fn test_concurrency_is_bounded() {
    let authority = Arc::new(RecordingAuthority::new(Duration::from_millis(30)));
    let validator = IdentifierValidator::new(settings(3, Duration::from_secs(10)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>);

    let report = validator.validate_purls(&purls(12));
    assert_eq!(report.valid_count(), 12);
    assert!(authority.peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn test_deadline_returns_partial_results() {
    let authority = Arc::new(RecordingAuthority::new(Duration::from_millis(1)));
    let validator = IdentifierValidator::new(settings(4, Duration::from_millis(300)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>);

    let mut batch = purls(3);
    batch.push("pkg:npm/hang@1.0.0".to_string());
    let started = Instant::now();
    let report = validator.validate_purls(&batch);
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.valid_count(), 3);
    assert_eq!(report.results["pkg:npm/hang@1.0.0"], false);
    assert_eq!(
        report.unavailable.keys().collect::<Vec<_>>(),
        vec!["pkg:npm/hang@1.0.0"]
    );
}

#[test]
fn test_unavailable_lookup_does_not_poison_batch() {
    let authority = Arc::new(RecordingAuthority::new(Duration::ZERO));
    let validator = IdentifierValidator::new(settings(2, Duration::from_secs(10)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>);

    let report = validator.validate_purls(&[
        "pkg:pypi/requests@2.31.0".to_string(),
        "pkg:pypi/offline@1.0.0".to_string(),
        "pkg:pypi/missing@0.0.1".to_string(),
    ]);
    assert_eq!(report.results["pkg:pypi/requests@2.31.0"], true);
    assert_eq!(report.results["pkg:pypi/offline@1.0.0"], false);
    assert_eq!(report.results["pkg:pypi/missing@0.0.1"], false);
    assert!(report.unavailable["pkg:pypi/offline@1.0.0"].contains("HTTP 503"));
    assert!(!report.unavailable.contains_key("pkg:pypi/missing@0.0.1"));
}

#[test]
fn test_answers_are_served_from_cache() {
    let authority = Arc::new(RecordingAuthority::new(Duration::ZERO));
    let cache = Arc::new(ValidationCache::new(100));
    let validator = IdentifierValidator::new(settings(4, Duration::from_secs(10)))
        .with_authority(Arc::clone(&authority) as Arc<dyn LookupAuthority>)
        .with_cache(Arc::clone(&cache));

    let batch = purls(5);
    let first = validator.validate_purls(&batch);
    assert_eq!(authority.call_count(), 5);

    let second = validator.validate_purls(&batch);
    assert_eq!(first, second);
    assert_eq!(authority.call_count(), 5);

    cache.evict(IdentifierKind::Purl, batch.iter().take(2).map(String::as_str));
    validator.validate_purls(&batch);
    let calls = authority.calls.lock().unwrap();
    assert_eq!(calls.len(), 7);
    let unique: HashSet<&String> = calls.iter().collect();
    assert_eq!(unique.len(), 5);
}
