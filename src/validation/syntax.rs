//! Syntactic checks for CPE 2.3 formatted strings and package URLs.

use crate::model::Cpe23;
use packageurl::PackageUrl;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

/// One attribute of a CPE 2.3 formatted string (CPE naming 6.2 `avstring`).
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"^(?:[*-]|(?:\?+|\*)?(?:[A-Za-z0-9._-]|\\[\\*?!"#$%&'()+,/:;<=>@\[\]^`{|}~-])+(?:\?+|\*)?)$"##,
    )
    .expect("static regex")
});

/// Language tag (RFC 5646 subset used by CPE).
static LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[*-]|[A-Za-z]{2,3}(?:-(?:[A-Za-z]{2}|[0-9]{3}))?)$").expect("static regex")
});

/// Whether `value` is a well-formed CPE 2.3 formatted string.
///
/// CPE 2.2 URIs (`cpe:/...`) are rejected.
#[must_use]
pub fn is_valid_cpe23(value: &str) -> bool {
    let Some(cpe) = Cpe23::parse(value) else {
        return false;
    };
    if !matches!(cpe.part.as_str(), "a" | "h" | "o" | "*" | "-") {
        return false;
    }
    if !LANGUAGE.is_match(&cpe.language) {
        return false;
    }
    cpe.attributes()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 0 && *i != 6)
        .all(|(_, attr)| ATTRIBUTE.is_match(attr))
}

/// Whether `value` is a syntactically valid package URL.
#[must_use]
pub fn is_valid_purl(value: &str) -> bool {
    if !value.starts_with("pkg:") {
        return false;
    }
    match PackageUrl::from_str(value) {
        Ok(purl) => !purl.name().is_empty(),
        Err(e) => {
            tracing::debug!(purl = value, error = %e, "Malformed purl");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cpes() {
        for cpe in [
            "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*:*",
            "cpe:2.3:o:linux:linux_kernel:5.10:-:*:*:*:*:*:*",
            "cpe:2.3:a:lodash:lodash:4.17.21:*:*:*:*:node.js:*:*",
            r"cpe:2.3:a:microsoft:internet_explorer:8.0.6001:beta:*:*:*:*:*:*",
            r"cpe:2.3:a:vendor:prod\:uct:1.0:*:*:en-us:*:*:*:*",
            "cpe:2.3:a:vendor:prod*:1.?:*:*:*:*:*:*:*",
        ] {
            assert!(is_valid_cpe23(cpe), "{cpe}");
        }
    }

    #[test]
    fn test_invalid_cpes() {
        for cpe in [
            "",
            "cpe:/a:apache:log4j:2.14.1",
            "cpe:2.3:x:apache:log4j:2.14.1:*:*:*:*:*:*:*",
            "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*",
            "cpe:2.3:a:apa che:log4j:2.14.1:*:*:*:*:*:*:*",
            "cpe:2.3:a:apache::2.14.1:*:*:*:*:*:*:*",
            "cpe:2.3:a:apache:log4j:2.14.1:*:*:english:*:*:*:*",
        ] {
            assert!(!is_valid_cpe23(cpe), "{cpe}");
        }
    }

    #[test]
    fn test_purl_syntax() {
        assert!(is_valid_purl("pkg:npm/lodash@4.17.21"));
        assert!(is_valid_purl("pkg:npm/%40angular/core@17.0.0"));
        assert!(is_valid_purl("pkg:maven/org.apache.logging.log4j/log4j-core@2.14.1"));
        assert!(!is_valid_purl("npm/lodash@4.17.21"));
        assert!(!is_valid_purl("pkg:"));
        assert!(!is_valid_purl("pkg:npm"));
    }
}
