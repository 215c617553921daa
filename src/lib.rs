//! **Cross-scanner SBOM reconciliation.**
//!
//! Different SBOM scanners run against the same repository rarely agree.
//! `sbom-reconcile` normalizes their outputs into one component model, finds
//! the packages they agree on (exactly or approximately), reports what each
//! scanner found alone, and builds a single merged SBOM from the agreed
//! packages plus the unique ones a reviewer approves.
//!
//! ## Modules
//!
//! - **[`normalize`]**: turns CycloneDX, SPDX, Syft and Trivy JSON into
//!   [`NormalizedSbom`]s, de-duplicated by `(name, version)`.
//! - **[`matching`]**: exact and weighted fuzzy matching between two scanners'
//!   component lists.
//! - **[`analysis`]**: groups matches across all scanners (union-find) into
//!   common packages, unique packages and per-scanner agreement scores.
//! - **[`merge`]**: the merged component list, its re-linked dependencies and
//!   a CycloneDX export.
//! - **[`graph`]**: per-scanner dependency graphs with stable node ids.
//! - **[`validation`]**: CPE 2.3 / PURL syntax checks plus NVD and package
//!   registry lookups, batched with bounded concurrency and a deadline.
//! - **[`lifecycle`]**: the scan state machine, scanner fan-out and reruns.
//! - **[`service`]**: the scan API over an in-memory scan table.
//!
//! ## Example
//!
//! ```no_run
//! use sbom_reconcile::{Analyzer, NormalizedScan, Normalizer, ScannerId, SchemaFamily};
//! use std::collections::BTreeSet;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let normalizer = Normalizer::new();
//!     let trivy = normalizer.normalize_str(
//!         &ScannerId::trivy(),
//!         SchemaFamily::Auto,
//!         &std::fs::read_to_string("trivy.json")?,
//!     )?;
//!     let syft = normalizer.normalize_str(
//!         &ScannerId::syft(),
//!         SchemaFamily::Auto,
//!         &std::fs::read_to_string("syft.json")?,
//!     )?;
//!
//!     let scan = NormalizedScan { sboms: vec![trivy, syft], ..Default::default() };
//!     let analysis = Analyzer::default().analyze(&scan, &BTreeSet::new());
//!     println!("{} packages in common", analysis.common_packages.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::unwrap_used)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names
)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod invoker;
pub mod lifecycle;
pub mod matching;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod service;
pub mod validation;

pub use analysis::{AnalysisResult, Analyzer, NormalizedScan};
pub use config::{AppConfig, AppConfigBuilder, ConfigError, Validatable};
pub use error::{ErrorContext, OptionContext, ReconcileError, Result};
pub use graph::{Graph, GraphBuilder};
pub use invoker::{CommandInvoker, ProcessInvoker};
pub use lifecycle::{LifecycleContext, ScanLifecycle};
pub use matching::{MatchPolicy, MatchType, Matcher};
pub use merge::{MergedSbom, Merger, UniqueSelection};
pub use model::{
    Component, NormalizedSbom, SbomResult, ScanRecord, ScanStatus, ScannerId, ScannerRegistry,
    ScannerSpec, SchemaFamily,
};
pub use normalize::Normalizer;
pub use service::ScanService;
pub use validation::{IdentifierKind, IdentifierValidator, ValidationReport};
