//! CLI command handlers.
//!
//! Testable handlers invoked by main.rs, one per subcommand family.

mod output;
mod reconcile;
mod scan;
mod validate;

pub use output::{OutputTarget, SbomInput};
pub use reconcile::{run_analyze, run_graph, run_merge, MergeArgs, ReconcileInputs};
pub use scan::{run_scan, ScanArgs};
pub use validate::{run_validate_identifiers, ValidateArgs, EXIT_INVALID};
