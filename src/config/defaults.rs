//! Default values for sbom-reconcile configuration.

/// Matching preset used when none is configured.
pub const DEFAULT_MATCHING_PRESET: &str = "balanced";

/// Names accepted by `matching.preset`.
pub const MATCHING_PRESETS: &[&str] = &["strict", "balanced", "permissive"];

/// Default bound on concurrent authoritative lookups.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Default deadline for one validation batch (seconds).
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 60;

/// Default per-request HTTP timeout (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default capacity of the identifier cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Environment variable holding the NVD API key.
pub const NVD_API_KEY_ENV: &str = "NVD_API_KEY";
