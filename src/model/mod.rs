//! Canonical data model shared by every reconciliation stage.
//!
//! Scanner output is normalized into [`Component`] records grouped in a
//! [`NormalizedSbom`]; scans are tracked as [`ScanRecord`]s holding one
//! [`SbomResult`] per registered scanner.

mod cpe;
mod identifiers;
mod sbom;
mod scan;
mod scanner;

pub use cpe::*;
pub use identifiers::*;
pub use sbom::*;
pub use scan::*;
pub use scanner::*;
