//! `scan` handler: clone a repository and run every configured scanner.

use super::output::{write_json, OutputTarget};
use crate::config::AppConfig;
use crate::invoker::CommandInvoker;
use crate::service::{ScanService, UploadRepositoryRequest};
use anyhow::Result;
use std::sync::Arc;

/// Options of the `scan` command.
#[derive(Debug, Clone)]
pub struct ScanArgs {
    pub repo_url: String,
    pub github_token: Option<String>,
    /// Print the analysis instead of the scan record
    pub analyze: bool,
    pub keep_checkout: bool,
    pub output: OutputTarget,
}

/// Run a scan to completion and print the record (or its analysis).
#[allow(clippy::needless_pass_by_value)]
pub fn run_scan(config: AppConfig, args: ScanArgs) -> Result<()> {
    let service = ScanService::new(&config, Arc::new(CommandInvoker::new()))?;
    let response = service.submit(UploadRepositoryRequest {
        repo_url: args.repo_url.clone(),
        github_token: args.github_token.clone(),
    })?;

    let record = service.run_scan(&response.scan_id)?;
    for (scanner, result) in &record.results {
        match &result.error {
            Some(error) => tracing::warn!("{scanner} failed: {error}"),
            None => tracing::info!("{scanner}: {} components", result.component_count),
        }
    }

    let written = if args.analyze {
        write_json(&service.scan_analysis(&response.scan_id)?, &args.output)
    } else {
        write_json(&record, &args.output)
    };
    if !args.keep_checkout {
        service.delete_scan(&response.scan_id)?;
    }
    written
}
