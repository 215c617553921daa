#![no_main]
use libfuzzer_sys::fuzz_target;

/// Fuzz the schema family detection.
///
/// Exercises the confidence-based adapter selection without extraction.
fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = sbom_reconcile::Normalizer::new().detect_family(&doc);
    }
});
