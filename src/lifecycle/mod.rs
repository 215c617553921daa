//! Scan state machine.
//!
//! ```text
//! pending ──run──▶ in-progress ──all results──▶ completed
//!                      │                            │
//!                      └──clone failed──▶ failed    │
//!                                           │       │
//!            rerun(scanner) ◀───────────────┴───────┘
//! ```
//!
//! A scan record is only mutated through its own [`ScanLifecycle`]. Scanner
//! runs fan out to one worker thread per scanner; each has its own deadline
//! and a timeout turns into an error result for that scanner only. A rerun
//! resets one scanner's result and leaves the others and `completed_at`
//! alone until it finishes.

use crate::error::{OptionContext, ReconcileError, Result};
use crate::invoker::ProcessInvoker;
use crate::model::{
    SbomResult, ScanRecord, ScanStatus, ScannerId, ScannerRegistry, ScannerSource, ScannerSpec,
};
use crate::normalize::tech_stack::detect_repository_tech_stack;
use crate::normalize::{strip_envelope, Normalizer};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Shared collaborators of every lifecycle.
#[derive(Clone)]
pub struct LifecycleContext {
    pub registry: Arc<ScannerRegistry>,
    pub invoker: Arc<dyn ProcessInvoker>,
    pub normalizer: Arc<Normalizer>,
    /// Parent directory for repository checkouts
    pub work_dir: PathBuf,
}

impl std::fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("registry", &self.registry)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

/// Owns one [`ScanRecord`] and drives its transitions.
#[derive(Debug)]
pub struct ScanLifecycle {
    record: RwLock<ScanRecord>,
    ctx: LifecycleContext,
    /// Checkout kept for reruns
    repo_path: Mutex<Option<PathBuf>>,
    token: Option<String>,
}

impl ScanLifecycle {
    /// Wrap a pending record.
    #[must_use]
    pub fn new(record: ScanRecord, ctx: LifecycleContext, token: Option<String>) -> Self {
        Self {
            record: RwLock::new(record),
            ctx,
            repo_path: Mutex::new(None),
            token,
        }
    }

    /// Wrap a record whose repository is already checked out at `repo`.
    #[must_use]
    pub fn with_checkout(mut self, repo: PathBuf) -> Self {
        self.repo_path = Mutex::new(Some(repo));
        self
    }

    /// Copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> ScanRecord {
        self.record.read().expect("scan record lock poisoned").clone()
    }

    #[must_use]
    pub fn status(&self) -> ScanStatus {
        self.record.read().expect("scan record lock poisoned").status
    }

    #[must_use]
    pub fn scan_id(&self) -> String {
        self.record
            .read()
            .expect("scan record lock poisoned")
            .scan_id
            .clone()
    }

    /// Checkout directory, if one exists.
    #[must_use]
    pub fn repo_path(&self) -> Option<PathBuf> {
        self.repo_path.lock().expect("repo path lock poisoned").clone()
    }

    /// Run every registered scanner against a fresh checkout.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::InvalidTransition`] unless the scan is pending, and
    /// [`ReconcileError::RepositoryAcquisition`] when the clone fails (the
    /// scan is then `failed`). Scanner failures are recorded, not returned.
    /// A rerun reserved while this runs keeps the scan `in-progress` until
    /// [`Self::run_rerun`] finishes it.
    pub fn run(&self) -> Result<ScanRecord> {
        let specs: Vec<ScannerSpec> = self.ctx.registry.specs().cloned().collect();
        let (scan_id, repo_url) = {
            let mut record = self.record.write().expect("scan record lock poisoned");
            if record.status != ScanStatus::Pending {
                return Err(ReconcileError::InvalidTransition {
                    from: record.status.to_string(),
                    to: ScanStatus::InProgress.to_string(),
                });
            }
            record.status = ScanStatus::InProgress;
            record.running_scanners = specs.iter().map(|s| s.id.clone()).collect();
            (record.scan_id.clone(), record.repo_url.clone())
        };
        tracing::info!(scan_id = %scan_id, repo = %repo_url, "Scan in progress");

        let repo = match self.checkout(&scan_id, &repo_url) {
            Ok(repo) => repo,
            Err(e) => {
                let mut record = self.record.write().expect("scan record lock poisoned");
                record.status = ScanStatus::Failed;
                record.error = Some(e.to_string());
                record.running_scanners.clear();
                record.completed_at = Some(Utc::now());
                tracing::error!(scan_id = %scan_id, error = %e, "Scan failed");
                return Err(e);
            }
        };

        let tags = detect_repository_tech_stack(&repo);
        self.record
            .write()
            .expect("scan record lock poisoned")
            .add_tech_stack(&tags);

        self.dispatch(&specs, &repo, &[], false);

        let mut record = self.record.write().expect("scan record lock poisoned");
        if !record.running_scanners.is_empty() {
            tracing::info!(
                scan_id = %scan_id,
                pending = record.running_scanners.len(),
                "Initial run done, waiting for reruns"
            );
            return Ok(record.clone());
        }
        record.status = ScanStatus::Completed;
        record.completed_at = Some(Utc::now());
        tracing::info!(
            scan_id = %scan_id,
            succeeded = record.successful_results().count(),
            total = record.results.len(),
            "Scan completed"
        );
        Ok(record.clone())
    }

    /// Reserve a rerun of `scanner`.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownScanner`] for unregistered names,
    /// [`ReconcileError::RerunInProgress`] when that scanner is already
    /// running, and [`ReconcileError::InvalidTransition`] for pending scans.
    pub fn request_rerun(&self, scanner: &ScannerId) -> Result<()> {
        self.ctx
            .registry
            .get(scanner)
            .or_unknown_scanner(scanner.as_str())?;

        let mut record = self.record.write().expect("scan record lock poisoned");
        if record.status == ScanStatus::Pending {
            return Err(ReconcileError::InvalidTransition {
                from: record.status.to_string(),
                to: ScanStatus::InProgress.to_string(),
            });
        }
        if record.is_running(scanner) {
            return Err(ReconcileError::RerunInProgress {
                scan_id: record.scan_id.clone(),
                scanner: scanner.to_string(),
            });
        }
        record.running_scanners.insert(scanner.clone());
        record
            .results
            .insert(scanner.clone(), SbomResult::pending_rerun(scanner.clone()));
        record.status = ScanStatus::InProgress;
        tracing::info!(scan_id = %record.scan_id, scanner = %scanner, "Rerun requested");
        Ok(())
    }

    /// Execute a rerun previously reserved with [`Self::request_rerun`].
    ///
    /// `commands` run in the checkout before the scanner. A scan without a
    /// usable checkout (failed or imported) is cloned again first.
    pub fn run_rerun(&self, scanner: &ScannerId, commands: &[String]) -> Result<SbomResult> {
        let spec = self
            .ctx
            .registry
            .get(scanner)
            .or_unknown_scanner(scanner.as_str())?
            .clone();
        let (scan_id, repo_url) = {
            let record = self.record.read().expect("scan record lock poisoned");
            if !record.is_running(scanner) {
                return Err(ReconcileError::InvalidTransition {
                    from: record.status.to_string(),
                    to: format!("rerun of {scanner}"),
                });
            }
            (record.scan_id.clone(), record.repo_url.clone())
        };

        let existing = self.repo_path().filter(|p| p.exists());
        let repo = match existing {
            Some(repo) => repo,
            None => match self.checkout(&scan_id, &repo_url) {
                Ok(repo) => repo,
                Err(e) => {
                    let result = SbomResult::failure(scanner.clone(), e.to_string()).with_rerun(true);
                    self.finish_rerun(scanner, result.clone());
                    return Err(e);
                }
            },
        };

        self.dispatch(std::slice::from_ref(&spec), &repo, commands, true);
        let result = self
            .snapshot()
            .results
            .get(scanner)
            .cloned()
            .unwrap_or_else(|| SbomResult::failure(scanner.clone(), "no result recorded"));
        self.finish_rerun(scanner, result.clone());
        Ok(result)
    }

    /// Request and execute a rerun in one call.
    pub fn rerun(&self, scanner: &ScannerId, commands: &[String]) -> Result<SbomResult> {
        self.request_rerun(scanner)?;
        self.run_rerun(scanner, commands)
    }

    /// Remove the checkout directory.
    pub fn cleanup(&self) {
        let path = self.repo_path.lock().expect("repo path lock poisoned").take();
        if let Some(path) = path.filter(|p| p.starts_with(&self.ctx.work_dir)) {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Checkout cleanup failed");
            }
        }
    }

    fn checkout(&self, scan_id: &str, repo_url: &str) -> Result<PathBuf> {
        let dest = self.ctx.work_dir.join(scan_id);
        let repo = self
            .ctx
            .invoker
            .clone_repository(repo_url, self.token.as_deref(), &dest)?;
        *self.repo_path.lock().expect("repo path lock poisoned") = Some(repo.clone());
        Ok(repo)
    }

    fn finish_rerun(&self, scanner: &ScannerId, result: SbomResult) {
        let mut record = self.record.write().expect("scan record lock poisoned");
        record.results.insert(scanner.clone(), result);
        record.running_scanners.remove(scanner);
        if record.running_scanners.is_empty() {
            record.status = ScanStatus::Completed;
            record.error = None;
            record.completed_at = Some(Utc::now());
            tracing::info!(scan_id = %record.scan_id, scanner = %scanner, "Rerun completed");
        }
    }

    /// Fan out to one worker per scanner and record results as they arrive.
    fn dispatch(&self, specs: &[ScannerSpec], repo: &Path, commands: &[String], rerun: bool) {
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        let mut deadlines: HashMap<ScannerId, Instant> = HashMap::new();
        let repo_url = self
            .record
            .read()
            .expect("scan record lock poisoned")
            .repo_url
            .clone();

        for spec in specs {
            deadlines.insert(spec.id.clone(), started + spec.timeout());
            let tx = tx.clone();
            let invoker = Arc::clone(&self.ctx.invoker);
            let spec = spec.clone();
            let repo = repo.to_path_buf();
            let commands = commands.to_vec();
            let repo_url = repo_url.clone();
            let token = self.token.clone();
            std::thread::spawn(move || {
                let outcome = match spec.source {
                    ScannerSource::Command => invoker.run_scanner(&spec, &repo, &commands),
                    ScannerSource::GithubDependencyGraph => {
                        invoker.fetch_sbom(&spec, &repo_url, token.as_deref())
                    }
                };
                let _ = tx.send((spec.id, outcome));
            });
        }
        drop(tx);

        while !deadlines.is_empty() {
            let Some(next) = deadlines.values().min().copied() else {
                break;
            };
            let wait = next.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok((scanner, outcome)) => {
                    if deadlines.remove(&scanner).is_none() {
                        continue;
                    }
                    let result = self.to_result(&scanner, outcome).with_rerun(rerun);
                    self.record_result(result, rerun);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<ScannerId> = deadlines
                        .iter()
                        .filter(|(_, d)| **d <= now)
                        .map(|(s, _)| s.clone())
                        .collect();
                    for scanner in expired {
                        deadlines.remove(&scanner);
                        let after = self
                            .ctx
                            .registry
                            .get(&scanner)
                            .map(ScannerSpec::timeout)
                            .unwrap_or_default();
                        let err = ReconcileError::scanner_timeout(scanner.as_str(), after);
                        tracing::warn!(scanner = %scanner, error = %err, "Scanner timed out");
                        let result = SbomResult::failure(scanner, err.to_string()).with_rerun(rerun);
                        self.record_result(result, rerun);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for scanner in deadlines.keys() {
                        let result = SbomResult::failure(scanner.clone(), "scanner worker exited")
                            .with_rerun(rerun);
                        self.record_result(result, rerun);
                    }
                    break;
                }
            }
        }
    }

    fn to_result(
        &self,
        scanner: &ScannerId,
        outcome: Result<serde_json::Value>,
    ) -> SbomResult {
        let doc = match outcome {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(scanner = %scanner, error = %e, "Scanner failed");
                return SbomResult::failure(scanner.clone(), e.to_string());
            }
        };
        let doc = strip_envelope(doc);
        let hint = self
            .ctx
            .registry
            .get(scanner)
            .map(|s| s.schema)
            .unwrap_or_default();
        match self.ctx.normalizer.normalize(scanner, hint, &doc) {
            Ok(sbom) => {
                tracing::info!(
                    scanner = %scanner,
                    components = sbom.component_count(),
                    format = %sbom.format,
                    "Scanner output normalized"
                );
                SbomResult::success(scanner.clone(), doc, sbom.component_count())
            }
            Err(e) => {
                tracing::warn!(scanner = %scanner, error = %e, "Scanner output rejected");
                SbomResult::failure(scanner.clone(), e.to_string())
            }
        }
    }

    fn record_result(&self, result: SbomResult, rerun: bool) {
        let mut record = self.record.write().expect("scan record lock poisoned");
        if !rerun {
            record.running_scanners.remove(&result.scanner);
        }
        record.results.insert(result.scanner.clone(), result);
    }
}
