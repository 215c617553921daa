#![no_main]
use libfuzzer_sys::fuzz_target;
use sbom_reconcile::{Normalizer, ScannerId, SchemaFamily};
use serde_json::{json, Value};

/// Fuzz the CycloneDX adapter directly.
///
/// The input is used as the `components` value of an otherwise valid
/// envelope so the fuzzer spends its time inside component extraction.
fuzz_target!(|data: &[u8]| {
    let Ok(components) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let doc = json!({
        "bomFormat": "CycloneDX",
        "specVersion": "1.5",
        "components": components,
        "dependencies": [],
    });
    let _ = Normalizer::new().normalize(&ScannerId::cdxgen(), SchemaFamily::CycloneDx, &doc);
});
