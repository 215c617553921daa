#![no_main]
use libfuzzer_sys::fuzz_target;
use sbom_reconcile::{GraphBuilder, Normalizer, ScannerId, SchemaFamily};

/// Fuzz schema detection plus extraction on arbitrary text, then build the
/// dependency graph of whatever normalizes.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let normalizer = Normalizer::new();
        if let Ok(sbom) = normalizer.normalize_str(&ScannerId::new("fuzz"), SchemaFamily::Auto, s) {
            let graph = GraphBuilder::new().build(&sbom);
            assert!(graph.is_closed());
        }
    }
});
