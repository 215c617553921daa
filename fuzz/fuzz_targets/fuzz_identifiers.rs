#![no_main]
use libfuzzer_sys::fuzz_target;
use sbom_reconcile::validation::{is_valid_cpe23, is_valid_purl};
use sbom_reconcile::matching::{cpe_similarity, purl_similarity};

/// Fuzz the CPE and PURL grammars and their similarity scores.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = is_valid_cpe23(s);
        let _ = is_valid_purl(s);
        if let Some(score) = cpe_similarity(s, s) {
            assert!((0.0..=1.0).contains(&score));
        }
        if let Some(score) = purl_similarity(s, "pkg:npm/lodash@4.17.21") {
            assert!((0.0..=1.0).contains(&score));
        }
    }
});
