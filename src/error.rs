//! Unified error types for sbom-reconcile.
//!
//! Failures are contained to the smallest affected unit: one scanner, one
//! component selection, or one identifier. Only repository acquisition before
//! any scanner starts is fatal to a whole scan.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sbom-reconcile operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReconcileError {
    /// Scanner output that is not a parseable SBOM of a known schema family
    #[error("Failed to normalize SBOM: {context}")]
    Normalization {
        context: String,
        #[source]
        source: NormalizationErrorKind,
    },

    /// Per-scanner execution failures (never scan-fatal)
    #[error("Scanner '{scanner}' failed: {source}")]
    Scanner {
        scanner: String,
        #[source]
        source: ScannerErrorKind,
    },

    /// A merge selection referenced a component that is not unique to that scanner
    #[error("Unknown component {name}@{version} in unique packages of '{scanner}'")]
    UnknownComponent {
        scanner: String,
        name: String,
        version: String,
    },

    /// Scanner name that is not present in the scanner registry or scan
    #[error("Unknown scanner: {0}")]
    UnknownScanner(String),

    /// No scan with the given id
    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    /// A rerun for the same scanner is already in flight
    #[error("Rerun of '{scanner}' already in progress for scan {scan_id}")]
    RerunInProgress { scan_id: String, scanner: String },

    /// Authoritative lookup for one identifier could not be completed
    #[error("Validation unavailable for '{identifier}': {reason}")]
    ValidationUnavailable { identifier: String, reason: String },

    /// Cloning or otherwise acquiring the repository failed
    #[error("Repository acquisition failed for {url}: {message}")]
    RepositoryAcquisition { url: String, message: String },

    /// State machine transition that is not allowed
    #[error("Invalid scan transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// IO errors with context
    #[error("IO error at {path:?}: {message}")]
    Io {
        path: Option<PathBuf>,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Specific normalization error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NormalizationErrorKind {
    #[error("Unknown SBOM schema - expected CycloneDX, SPDX, Syft or Trivy markers")]
    UnknownSchema,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),
}

/// Specific scanner error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScannerErrorKind {
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("execution failed: {0}")]
    Execution(String),
}

// ============================================================================
// Result type alias
// ============================================================================

/// Convenient Result type for sbom-reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

// ============================================================================
// Error construction helpers
// ============================================================================

impl ReconcileError {
    /// Create a normalization error with context
    pub fn normalization(context: impl Into<String>, source: NormalizationErrorKind) -> Self {
        Self::Normalization {
            context: context.into(),
            source,
        }
    }

    /// Create a normalization error for an unrecognized document
    pub fn unknown_schema(context: impl Into<String>) -> Self {
        Self::normalization(context, NormalizationErrorKind::UnknownSchema)
    }

    /// Create a scanner timeout error
    pub fn scanner_timeout(scanner: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Scanner {
            scanner: scanner.into(),
            source: ScannerErrorKind::Timeout(after),
        }
    }

    /// Create a scanner execution error
    pub fn scanner_execution(scanner: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scanner {
            scanner: scanner.into(),
            source: ScannerErrorKind::Execution(message.into()),
        }
    }

    /// Create a validation-unavailable error for one identifier
    pub fn validation_unavailable(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationUnavailable {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let message = format!("{source}");
        Self::Io {
            path: Some(path.into()),
            message,
            source,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true for scanner timeouts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Scanner {
                source: ScannerErrorKind::Timeout(_),
                ..
            }
        )
    }

    /// HTTP-equivalent status code for the presentation layer.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ScanNotFound(_) => 404,
            Self::UnknownScanner(_) | Self::Config(_) => 400,
            Self::UnknownComponent { .. } | Self::Normalization { .. } => 422,
            Self::RerunInProgress { .. } | Self::InvalidTransition { .. } => 409,
            Self::ValidationUnavailable { .. } => 503,
            Self::Scanner { .. }
            | Self::RepositoryAcquisition { .. }
            | Self::Io { .. } => 500,
        }
    }
}

// ============================================================================
// Conversions from existing error types
// ============================================================================

impl From<std::io::Error> for ReconcileError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: None,
            message: format!("{err}"),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        Self::normalization(
            "JSON deserialization",
            NormalizationErrorKind::InvalidJson(err.to_string()),
        )
    }
}

// ============================================================================
// Error context extension trait
// ============================================================================

/// Extension trait for adding context to errors.
///
/// Context strings chain outermost-first, so a failure reads like
/// `"loading trivy output: JSON deserialization"`.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context from a closure, evaluated only on error.
    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: Into<ReconcileError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        let ctx: String = context.into();
        self.map_err(|e| add_context_to_error(e.into(), &ctx))
    }

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| {
            let ctx: String = f().into();
            add_context_to_error(e.into(), &ctx)
        })
    }
}

/// Add context to an error, chaining with any existing context.
fn add_context_to_error(err: ReconcileError, new_ctx: &str) -> ReconcileError {
    match err {
        ReconcileError::Normalization {
            context: existing,
            source,
        } => ReconcileError::Normalization {
            context: chain_context(new_ctx, &existing),
            source,
        },
        ReconcileError::Io {
            path,
            message,
            source,
        } => ReconcileError::Io {
            path,
            message: chain_context(new_ctx, &message),
            source,
        },
        ReconcileError::Config(msg) => ReconcileError::Config(chain_context(new_ctx, &msg)),
        ReconcileError::RepositoryAcquisition { url, message } => {
            ReconcileError::RepositoryAcquisition {
                url,
                message: chain_context(new_ctx, &message),
            }
        }
        other => other,
    }
}

/// Chain two context strings together.
fn chain_context(new: &str, existing: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else {
        format!("{new}: {existing}")
    }
}

/// Extension trait for Option types to convert to errors with context.
pub trait OptionContext<T> {
    /// Convert None to a `ScanNotFound` error for the given scan id.
    fn or_scan_not_found(self, scan_id: &str) -> Result<T>;

    /// Convert None to an `UnknownScanner` error.
    fn or_unknown_scanner(self, scanner: &str) -> Result<T>;
}

impl<T> OptionContext<T> for Option<T> {
    fn or_scan_not_found(self, scan_id: &str) -> Result<T> {
        self.ok_or_else(|| ReconcileError::ScanNotFound(scan_id.to_string()))
    }

    fn or_unknown_scanner(self, scanner: &str) -> Result<T> {
        self.ok_or_else(|| ReconcileError::UnknownScanner(scanner.to_string()))
    }
}
