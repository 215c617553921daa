//! CPE 2.3 formatted-string structure.

use serde::{Deserialize, Serialize};

const PREFIX: &str = "cpe:2.3:";

/// The eleven attribute fields of a CPE 2.3 formatted string.
///
/// Parsing only splits fields; attribute-level syntax rules are checked by
/// the identifier validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cpe23 {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub update: String,
    pub edition: String,
    pub language: String,
    pub sw_edition: String,
    pub target_sw: String,
    pub target_hw: String,
    pub other: String,
}

impl Cpe23 {
    /// Split a `cpe:2.3:` string on unescaped colons.
    ///
    /// Returns `None` unless the prefix matches and exactly eleven
    /// attribute fields follow it.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let body = value.strip_prefix(PREFIX)?;
        let fields = split_unescaped(body);
        let [part, vendor, product, version, update, edition, language, sw_edition, target_sw, target_hw, other]: [String; 11] =
            fields.try_into().ok()?;
        Some(Self {
            part,
            vendor,
            product,
            version,
            update,
            edition,
            language,
            sw_edition,
            target_sw,
            target_hw,
            other,
        })
    }

    /// Attribute fields in formatted-string order.
    #[must_use]
    pub fn attributes(&self) -> [&str; 11] {
        [
            &self.part,
            &self.vendor,
            &self.product,
            &self.version,
            &self.update,
            &self.edition,
            &self.language,
            &self.sw_edition,
            &self.target_sw,
            &self.target_hw,
            &self.other,
        ]
    }
}

/// Whether an attribute value is the ANY (`*`) or NA (`-`) logical value.
#[must_use]
pub fn is_logical_value(attr: &str) -> bool {
    attr == "*" || attr == "-"
}

fn split_unescaped(body: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(11);
    let mut current = String::new();
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == ':' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}
