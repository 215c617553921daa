//! `validate-cpes` / `validate-purls` handlers.

use super::output::{collect_identifiers, write_json, OutputTarget};
use crate::config::AppConfig;
use crate::invoker::CommandInvoker;
use crate::service::{ScanService, ValidateCpesRequest, ValidatePurlsRequest};
use crate::validation::IdentifierKind;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Exit code when at least one identifier is invalid.
pub const EXIT_INVALID: i32 = 1;

/// Options of the validation commands.
#[derive(Debug, Clone)]
pub struct ValidateArgs {
    pub kind: IdentifierKind,
    pub identifiers: Vec<String>,
    /// File with one identifier per line
    pub from_file: Option<PathBuf>,
    pub output: OutputTarget,
}

/// Validate a batch, print the report and return the exit code.
#[allow(clippy::needless_pass_by_value)]
pub fn run_validate_identifiers(config: AppConfig, args: ValidateArgs) -> Result<i32> {
    let identifiers = collect_identifiers(&args.identifiers, args.from_file.as_deref())?;
    let service = ScanService::new(&config, Arc::new(CommandInvoker::new()))?;

    let report = match args.kind {
        IdentifierKind::Cpe => service.validate_cpes(&ValidateCpesRequest { cpes: identifiers }),
        IdentifierKind::Purl => service.validate_purls(&ValidatePurlsRequest { purls: identifiers }),
    };
    tracing::info!(
        "{} {}s: {} valid, {} invalid, {} unverified",
        report.results.len(),
        args.kind,
        report.valid_count(),
        report.invalid_count(),
        report.unavailable.len()
    );

    write_json(&report, &args.output)?;
    Ok(if report.invalid_count() > 0 { EXIT_INVALID } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_purl_validation() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.json");
        let config = AppConfig::builder().offline(true).build();
        let code = run_validate_identifiers(
            config,
            ValidateArgs {
                kind: IdentifierKind::Purl,
                identifiers: vec!["pkg:npm/lodash@4.17.21".into(), "lodash".into()],
                from_file: None,
                output: OutputTarget::File(out.clone()),
            },
        )
        .unwrap();
        assert_eq!(code, EXIT_INVALID);

        let report = super::super::output::read_json(&out).unwrap();
        assert_eq!(report["results"]["pkg:npm/lodash@4.17.21"], true);
        assert_eq!(report["results"]["lodash"], false);
    }
}
