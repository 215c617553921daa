//! Offline reconciliation handlers: `analyze`, `merge` and `graph`.
//!
//! Each handler imports the given scanner documents as a completed scan and
//! then answers through the same service calls the scan API uses.

use super::output::{load_documents, read_json, write_json, OutputTarget, SbomInput};
use crate::config::AppConfig;
use crate::invoker::CommandInvoker;
use crate::merge::MergeOptions;
use crate::service::{MergeRequest, ScanService};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs shared by the offline handlers.
#[derive(Debug, Clone)]
pub struct ReconcileInputs {
    pub sboms: Vec<SbomInput>,
    /// Recorded as the scan's repository URL
    pub repo_url: String,
    pub output: OutputTarget,
}

/// Options of the `merge` command.
#[derive(Debug, Clone, Default)]
pub struct MergeArgs {
    /// JSON file with a `selected_unique_packages` map
    pub selection: Option<PathBuf>,
    pub options: MergeOptions,
    /// Emit a CycloneDX document instead of the merged component list
    pub cyclonedx: bool,
}

fn import(config: &AppConfig, inputs: &ReconcileInputs) -> Result<(ScanService, String)> {
    let documents = load_documents(&inputs.sboms)?;
    let mut config = config.clone();
    config.validation.offline = true;
    let service = ScanService::new(&config, Arc::new(CommandInvoker::new()))?;
    let response = service.import_results(&inputs.repo_url, documents);

    let record = service.sbom_results(&response.scan_id)?;
    for (scanner, result) in &record.results {
        match &result.error {
            Some(error) => tracing::warn!("{scanner}: {error}"),
            None => tracing::info!("{scanner}: {} components", result.component_count),
        }
    }
    Ok((service, response.scan_id))
}

/// Run the `analyze` command.
#[allow(clippy::needless_pass_by_value)]
pub fn run_analyze(config: AppConfig, inputs: ReconcileInputs) -> Result<()> {
    let (service, scan_id) = import(&config, &inputs)?;
    let analysis = service.scan_analysis(&scan_id)?;
    tracing::info!(
        "{} exact and {} fuzzy common packages",
        analysis.common_packages.exact.len(),
        analysis.common_packages.fuzzy.len()
    );
    write_json(&analysis, &inputs.output)
}

/// Run the `merge` command.
#[allow(clippy::needless_pass_by_value)]
pub fn run_merge(config: AppConfig, inputs: ReconcileInputs, args: MergeArgs) -> Result<()> {
    let (service, scan_id) = import(&config, &inputs)?;

    let mut request = match &args.selection {
        Some(path) => serde_json::from_value::<MergeRequest>(read_json(path)?)
            .with_context(|| format!("{} is not a merge selection", path.display()))?,
        None => MergeRequest::default(),
    };
    request.options.include_all_unique |= args.options.include_all_unique;
    request.options.exclude_github_actions |= args.options.exclude_github_actions;

    let merged = service.merge_sbom(&scan_id, &request)?;
    if args.cyclonedx {
        write_json(&service.download_merged_sbom(&scan_id)?, &inputs.output)
    } else {
        write_json(&merged, &inputs.output)
    }
}

/// Run the `graph` command for one scanner.
#[allow(clippy::needless_pass_by_value)]
pub fn run_graph(config: AppConfig, inputs: ReconcileInputs, scanner: &str) -> Result<()> {
    let (service, scan_id) = import(&config, &inputs)?;
    let graph = service.scan_graph(&scan_id, scanner)?;
    if graph.metadata.dropped_edges > 0 {
        tracing::warn!("{} edges dropped", graph.metadata.dropped_edges);
    }
    write_json(&graph, &inputs.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScannerId;
    use serde_json::json;
    use std::path::Path;

    fn write_doc(dir: &Path, name: &str, doc: &serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    fn inputs(dir: &Path, output: PathBuf) -> ReconcileInputs {
        let trivy = write_doc(
            dir,
            "trivy.json",
            &json!({"bomFormat": "CycloneDX", "specVersion": "1.4", "components": [
                {"type": "library", "name": "lodash", "version": "4.17.21", "purl": "pkg:npm/lodash@4.17.21"},
                {"type": "library", "name": "actions/checkout", "version": "v4"}
            ]}),
        );
        let syft = write_doc(
            dir,
            "syft.json",
            &json!({"bomFormat": "CycloneDX", "specVersion": "1.5", "components": [
                {"type": "library", "name": "lodash", "version": "4.17.21", "purl": "pkg:npm/lodash@4.17.21"}
            ]}),
        );
        ReconcileInputs {
            sboms: vec![
                SbomInput { scanner: ScannerId::trivy(), path: trivy },
                SbomInput { scanner: ScannerId::syft(), path: syft },
            ],
            repo_url: "local".to_string(),
            output: OutputTarget::File(output),
        }
    }

    #[test]
    fn test_run_analyze() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("analysis.json");
        run_analyze(AppConfig::default(), inputs(dir.path(), out.clone())).unwrap();
        let analysis = read_json(&out).unwrap();
        assert_eq!(analysis["common_packages"]["exact"].as_array().unwrap().len(), 1);
        assert_eq!(analysis["unique_packages"]["trivy"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_run_merge_excluding_actions() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.json");
        let args = MergeArgs {
            options: MergeOptions {
                include_all_unique: true,
                exclude_github_actions: true,
            },
            cyclonedx: true,
            ..MergeArgs::default()
        };
        run_merge(AppConfig::default(), inputs(dir.path(), out.clone()), args).unwrap();
        let export = read_json(&out).unwrap();
        assert_eq!(export["bomFormat"], "CycloneDX");
        assert_eq!(export["components"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_run_graph_unknown_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("graph.json");
        assert!(run_graph(AppConfig::default(), inputs(dir.path(), out.clone()), "cdxgen").is_err());
        run_graph(AppConfig::default(), inputs(dir.path(), out.clone()), "syft").unwrap();
        assert_eq!(read_json(&out).unwrap()["nodes"].as_array().unwrap().len(), 1);
    }
}
