//! Scan API facade.
//!
//! [`ScanService`] implements every operation of the scan API over an
//! in-memory scan table. Derived outputs (analysis, graphs, the last merge)
//! are memoized per scan and keyed by the record's inputs hash, so any change
//! to a scanner result invalidates them. Deleting a scan drops its derived
//! entry and its identifiers from the process-wide validation cache.

pub mod api;

pub use api::{
    MergeRequest, RerunRequest, ScanResponse, ScanStatusResponse, UploadRepositoryRequest,
    ValidateCpesRequest, ValidatePurlsRequest, ValidationResponse,
};

use crate::analysis::{normalize_record, AnalysisResult, Analyzer, NormalizedScan};
use crate::config::{AppConfig, ValidationConfig};
use crate::error::{OptionContext, ReconcileError, Result};
use crate::graph::{Graph, GraphBuilder};
use crate::invoker::ProcessInvoker;
use crate::lifecycle::{LifecycleContext, ScanLifecycle};
use crate::matching::Matcher;
use crate::merge::{CdxExport, MergeOptions, MergedSbom, Merger, UniqueSelection};
use crate::model::{SbomResult, ScanRecord, ScanStatus, ScannerId};
use crate::normalize::{strip_envelope, Normalizer};
use crate::validation::{IdentifierKind, IdentifierValidator, ValidationCache};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Derived results of one scan at one inputs hash.
#[derive(Debug)]
struct Derived {
    inputs_hash: u64,
    scan: NormalizedScan,
    analysis: AnalysisResult,
    graphs: RwLock<HashMap<ScannerId, Arc<Graph>>>,
    last_merge: RwLock<Option<MergedSbom>>,
}

/// Owns the scan table and serves the scan API.
#[derive(Debug)]
pub struct ScanService {
    scans: RwLock<HashMap<String, Arc<ScanLifecycle>>>,
    derived: RwLock<HashMap<String, Arc<Derived>>>,
    ctx: LifecycleContext,
    analyzer: Analyzer,
    graph_builder: GraphBuilder,
    validator: IdentifierValidator,
}

impl ScanService {
    /// Service wired from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP clients for authoritative validation cannot be built.
    pub fn new(config: &AppConfig, invoker: Arc<dyn ProcessInvoker>) -> Result<Self> {
        let ctx = LifecycleContext {
            registry: Arc::new(config.registry()),
            invoker,
            normalizer: Arc::new(Normalizer::new()),
            work_dir: config.lifecycle.resolved_work_dir(),
        };
        Ok(Self {
            scans: RwLock::new(HashMap::new()),
            derived: RwLock::new(HashMap::new()),
            ctx,
            analyzer: Analyzer::new(Matcher::new(config.matching.policy())),
            graph_builder: GraphBuilder::new(),
            validator: build_validator(&config.validation)?,
        })
    }

    /// Replace the identifier validator.
    #[must_use]
    pub fn with_validator(mut self, validator: IdentifierValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub const fn validator(&self) -> &IdentifierValidator {
        &self.validator
    }

    // ------------------------------------------------------------------
    // Scan lifecycle
    // ------------------------------------------------------------------

    /// Register a pending scan without running it.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Config`] for an empty repository URL.
    pub fn submit(&self, request: UploadRepositoryRequest) -> Result<ScanResponse> {
        let repo_url = request.repo_url.trim();
        if repo_url.is_empty() {
            return Err(ReconcileError::config("repo_url must not be empty"));
        }
        let scan_id = uuid::Uuid::new_v4().to_string();
        let record = ScanRecord::new(scan_id.clone(), repo_url);
        let token = request.github_token.filter(|t| !t.is_empty());
        let lifecycle = ScanLifecycle::new(record, self.ctx.clone(), token);
        self.scans
            .write()
            .expect("scan table lock poisoned")
            .insert(scan_id.clone(), Arc::new(lifecycle));
        tracing::info!(scan_id = %scan_id, repo = %repo_url, "Scan submitted");
        Ok(ScanResponse {
            scan_id,
            status: ScanStatus::Pending,
            message: "Scan submitted".to_string(),
        })
    }

    /// Run a submitted scan to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::ScanNotFound`], or the lifecycle's error when the
    /// repository cannot be acquired.
    pub fn run_scan(&self, scan_id: &str) -> Result<ScanRecord> {
        self.lifecycle(scan_id)?.run()
    }

    /// `POST scan/upload-repository`: submit and start the scan in the background.
    pub fn upload_repository(&self, request: UploadRepositoryRequest) -> Result<ScanResponse> {
        let response = self.submit(request)?;
        let lifecycle = self.lifecycle(&response.scan_id)?;
        std::thread::spawn(move || {
            if let Err(e) = lifecycle.run() {
                tracing::warn!(error = %e, "Background scan ended with an error");
            }
        });
        Ok(ScanResponse {
            message: "Scan started".to_string(),
            ..response
        })
    }

    /// Create a completed scan from documents produced elsewhere.
    ///
    /// Each document is normalized once to record its component count; a
    /// document that does not normalize becomes that scanner's error result.
    pub fn import_results(
        &self,
        repo_url: &str,
        documents: Vec<(ScannerId, serde_json::Value)>,
    ) -> ScanResponse {
        let scan_id = uuid::Uuid::new_v4().to_string();
        let mut record = ScanRecord::new(scan_id.clone(), repo_url);
        for (scanner, doc) in documents {
            let doc = strip_envelope(doc);
            let hint = self
                .ctx
                .registry
                .get(&scanner)
                .map(|s| s.schema)
                .unwrap_or_default();
            let result = match self.ctx.normalizer.normalize(&scanner, hint, &doc) {
                Ok(sbom) => {
                    record.add_tech_stack(&sbom.ecosystems);
                    SbomResult::success(scanner.clone(), doc, sbom.component_count())
                }
                Err(e) => {
                    tracing::warn!(scanner = %scanner, error = %e, "Imported SBOM rejected");
                    SbomResult::failure(scanner.clone(), e.to_string())
                }
            };
            record.results.insert(scanner, result);
        }
        record.status = ScanStatus::Completed;
        record.completed_at = Some(Utc::now());
        tracing::info!(
            scan_id = %scan_id,
            scanners = record.results.len(),
            "Imported scan results"
        );

        let lifecycle = ScanLifecycle::new(record, self.ctx.clone(), None);
        self.scans
            .write()
            .expect("scan table lock poisoned")
            .insert(scan_id.clone(), Arc::new(lifecycle));
        ScanResponse {
            scan_id,
            status: ScanStatus::Completed,
            message: "Scan results imported".to_string(),
        }
    }

    /// `GET scan/scan-status/{scanId}`
    pub fn scan_status(&self, scan_id: &str) -> Result<ScanStatusResponse> {
        Ok(ScanStatusResponse {
            status: self.lifecycle(scan_id)?.status(),
        })
    }

    /// `GET scan/sbom-results/{scanId}`
    pub fn sbom_results(&self, scan_id: &str) -> Result<ScanRecord> {
        Ok(self.lifecycle(scan_id)?.snapshot())
    }

    /// `POST scan/rerun-scanner`: blocks until the rerun finishes.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownScanner`] for unregistered names and
    /// [`ReconcileError::RerunInProgress`] while the same scanner is still
    /// running on this scan.
    pub fn rerun_scanner(&self, request: &RerunRequest) -> Result<SbomResult> {
        let lifecycle = self.lifecycle(&request.scan_id)?;
        let scanner = self
            .ctx
            .registry
            .find(&request.scanner)
            .or_unknown_scanner(&request.scanner)?
            .id
            .clone();
        let commands = request.commands.clone().unwrap_or_default();
        lifecycle.rerun(&scanner, &commands)
    }

    /// All scans, oldest first.
    #[must_use]
    pub fn list_scans(&self) -> Vec<ScanRecord> {
        let mut records: Vec<ScanRecord> = self
            .scans
            .read()
            .expect("scan table lock poisoned")
            .values()
            .map(|l| l.snapshot())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.scan_id.cmp(&b.scan_id)));
        records
    }

    /// Remove a scan, its checkout and everything derived from it.
    pub fn delete_scan(&self, scan_id: &str) -> Result<()> {
        let lifecycle = self
            .scans
            .write()
            .expect("scan table lock poisoned")
            .remove(scan_id)
            .or_scan_not_found(scan_id)?;
        lifecycle.cleanup();

        let derived = self
            .derived
            .write()
            .expect("derived cache lock poisoned")
            .remove(scan_id);
        let scan = match derived {
            Some(derived) => derived.scan.clone(),
            None => normalize_record(&lifecycle.snapshot(), &self.ctx.registry, &self.ctx.normalizer),
        };
        evict_identifiers(self.validator.cache(), &scan);
        tracing::info!(scan_id, "Scan deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived results
    // ------------------------------------------------------------------

    /// `GET scan/scan-analysis/{scanId}`
    pub fn scan_analysis(&self, scan_id: &str) -> Result<AnalysisResult> {
        Ok(self.derived(scan_id)?.analysis.clone())
    }

    /// `GET scan/scan-graph/{scanId}/{scanner}`
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownScanner`] when the scan has no result for
    /// `scanner`, and a scanner error when that result failed.
    pub fn scan_graph(&self, scan_id: &str, scanner: &str) -> Result<Graph> {
        let scanner = ScannerId::new(scanner);
        let derived = self.derived(scan_id)?;
        if let Some(graph) = derived
            .graphs
            .read()
            .expect("graph cache lock poisoned")
            .get(&scanner)
        {
            return Ok(Graph::clone(graph));
        }

        let Some(sbom) = derived.scan.get(&scanner) else {
            return Err(match derived.scan.failed.get(&scanner) {
                Some(error) => ReconcileError::scanner_execution(scanner.as_str(), error.clone()),
                None => ReconcileError::UnknownScanner(scanner.to_string()),
            });
        };
        let graph = Arc::new(self.graph_builder.build(sbom));
        derived
            .graphs
            .write()
            .expect("graph cache lock poisoned")
            .insert(scanner, Arc::clone(&graph));
        Ok(Graph::clone(&graph))
    }

    /// `POST scan/merge-sbom/{scanId}`
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownComponent`] when the selection names a package
    /// that is not unique to the given scanner.
    pub fn merge_sbom(&self, scan_id: &str, request: &MergeRequest) -> Result<MergedSbom> {
        let derived = self.derived(scan_id)?;
        let merged = merge_derived(&derived, &request.selected_unique_packages, request.options)?;
        *derived.last_merge.write().expect("merge cache lock poisoned") = Some(merged.clone());
        tracing::info!(
            scan_id,
            components = merged.component_count(),
            dependencies = merged.dependencies.len(),
            "Merged SBOM built"
        );
        Ok(merged)
    }

    /// `GET scan/download-merged-sbom/{scanId}`: the last merge as CycloneDX,
    /// or the common packages alone when nothing was merged yet.
    pub fn download_merged_sbom(&self, scan_id: &str) -> Result<CdxExport> {
        let derived = self.derived(scan_id)?;
        let last = derived
            .last_merge
            .read()
            .expect("merge cache lock poisoned")
            .clone();
        let merged = match last {
            Some(merged) => merged,
            None => merge_derived(&derived, &UniqueSelection::new(), MergeOptions::default())?,
        };
        Ok(merged.to_cyclonedx(scan_id))
    }

    /// `GET scan/download-sbom/{scanId}/{scanner}`: the raw document.
    pub fn download_sbom(&self, scan_id: &str, scanner: &str) -> Result<serde_json::Value> {
        let record = self.lifecycle(scan_id)?.snapshot();
        let scanner = ScannerId::new(scanner);
        let result = record
            .results
            .get(&scanner)
            .or_unknown_scanner(scanner.as_str())?;
        match (&result.sbom, &result.error) {
            (Some(doc), _) => Ok(doc.clone()),
            (None, Some(error)) => Err(ReconcileError::scanner_execution(scanner.as_str(), error.clone())),
            (None, None) => Err(ReconcileError::RerunInProgress {
                scan_id: record.scan_id,
                scanner: scanner.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Identifier validation
    // ------------------------------------------------------------------

    /// `POST scan/validate-cpes`
    #[must_use]
    pub fn validate_cpes(&self, request: &ValidateCpesRequest) -> ValidationResponse {
        self.validator.validate_cpes(&request.cpes)
    }

    /// `POST scan/purl-validate`
    #[must_use]
    pub fn validate_purls(&self, request: &ValidatePurlsRequest) -> ValidationResponse {
        self.validator.validate_purls(&request.purls)
    }

    // ------------------------------------------------------------------

    fn lifecycle(&self, scan_id: &str) -> Result<Arc<ScanLifecycle>> {
        self.scans
            .read()
            .expect("scan table lock poisoned")
            .get(scan_id)
            .cloned()
            .or_scan_not_found(scan_id)
    }

    /// Cached derived results, recomputed when the record's inputs changed.
    fn derived(&self, scan_id: &str) -> Result<Arc<Derived>> {
        let record = self.lifecycle(scan_id)?.snapshot();
        let inputs_hash = record.inputs_hash();
        if let Some(cached) = self
            .derived
            .read()
            .expect("derived cache lock poisoned")
            .get(scan_id)
            .filter(|d| d.inputs_hash == inputs_hash)
        {
            return Ok(Arc::clone(cached));
        }

        let scan = normalize_record(&record, &self.ctx.registry, &self.ctx.normalizer);
        let analysis = self.analyzer.analyze(&scan, &record.tech_stack);
        tracing::debug!(
            scan_id,
            inputs_hash,
            common = analysis.common_packages.len(),
            "Derived results recomputed"
        );
        let derived = Arc::new(Derived {
            inputs_hash,
            scan,
            analysis,
            graphs: RwLock::new(HashMap::new()),
            last_merge: RwLock::new(None),
        });
        self.derived
            .write()
            .expect("derived cache lock poisoned")
            .insert(scan_id.to_string(), Arc::clone(&derived));
        Ok(derived)
    }
}

fn merge_derived(
    derived: &Derived,
    selection: &UniqueSelection,
    options: MergeOptions,
) -> Result<MergedSbom> {
    Merger::new(options).merge(&derived.analysis, selection, &derived.scan)
}

fn evict_identifiers(cache: &ValidationCache, scan: &NormalizedScan) {
    let components = scan.sboms.iter().flat_map(|s| s.components.iter());
    let (cpes, purls): (Vec<_>, Vec<_>) = components
        .map(|c| (c.cpe.as_deref(), c.purl.as_deref()))
        .unzip();
    cache.evict(IdentifierKind::Cpe, cpes.into_iter().flatten());
    cache.evict(IdentifierKind::Purl, purls.into_iter().flatten());
}

#[cfg(feature = "authority")]
fn build_validator(config: &ValidationConfig) -> Result<IdentifierValidator> {
    use crate::validation::{NvdConfig, NVD_CPE_API};

    let cache = Arc::new(ValidationCache::new(config.cache_max_entries));
    if config.offline {
        return Ok(IdentifierValidator::new(config.settings()).with_cache(cache));
    }
    let nvd = NvdConfig {
        api_base: config
            .nvd_api_base
            .clone()
            .unwrap_or_else(|| NVD_CPE_API.to_string()),
        api_key: config.resolved_nvd_api_key(),
        timeout: config.request_timeout(),
    };
    Ok(IdentifierValidator::online(config.settings(), nvd, config.request_timeout())?.with_cache(cache))
}

#[cfg(not(feature = "authority"))]
fn build_validator(config: &ValidationConfig) -> Result<IdentifierValidator> {
    Ok(IdentifierValidator::new(config.settings())
        .with_cache(Arc::new(ValidationCache::new(config.cache_max_entries))))
}
