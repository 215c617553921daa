//! Structured PURL and CPE comparison.

use super::scoring::version_similarity;
use super::string_similarity::name_similarity;
use crate::model::{is_logical_value, Cpe23};
use packageurl::PackageUrl;
use std::str::FromStr;

/// Compare two purls segment by segment (type, namespace, name, version).
///
/// Returns `None` when either purl does not parse.
#[must_use]
pub fn purl_similarity(purl_a: &str, purl_b: &str) -> Option<f64> {
    let a = PackageUrl::from_str(purl_a).ok()?;
    let b = PackageUrl::from_str(purl_b).ok()?;

    let type_score = if a.ty().eq_ignore_ascii_case(b.ty()) {
        1.0
    } else {
        0.0
    };
    let namespace_score = match (a.namespace(), b.namespace()) {
        (None, None) => 1.0,
        (Some(na), Some(nb)) => name_similarity(na, nb),
        _ => 0.0,
    };
    let name_score = name_similarity(a.name(), b.name());
    let version_score = match (a.version(), b.version()) {
        (None, None) => 1.0,
        (Some(va), Some(vb)) => version_similarity(va, vb),
        _ => 0.5,
    };

    Some((type_score + namespace_score + name_score + version_score) / 4.0)
}

/// Compare two CPE 2.3 strings over part, vendor, product and version.
///
/// The ANY / NA logical values match anything. Returns `None` when either
/// string is not a CPE 2.3 formatted string.
#[must_use]
pub fn cpe_similarity(cpe_a: &str, cpe_b: &str) -> Option<f64> {
    let a = Cpe23::parse(cpe_a)?;
    let b = Cpe23::parse(cpe_b)?;

    let part = if a.part == b.part { 1.0 } else { 0.0 };
    let vendor = attribute_similarity(&a.vendor, &b.vendor, name_similarity);
    let product = attribute_similarity(&a.product, &b.product, name_similarity);
    let version = attribute_similarity(&a.version, &b.version, version_similarity);

    Some((part + vendor + product + version) / 4.0)
}

fn attribute_similarity(a: &str, b: &str, similarity: fn(&str, &str) -> f64) -> f64 {
    if is_logical_value(a) || is_logical_value(b) {
        return 1.0;
    }
    similarity(&unescape(a), &unescape(b))
}

fn unescape(attr: &str) -> String {
    attr.replace('\\', "")
}
