//! Canonical component records and the per-scanner normalized SBOM.

use super::{ScannerId, SchemaFamily};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a component within one scanner's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub name: String,
    pub version: String,
}

impl ComponentKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_lowercase(),
            version: version.into().trim().to_string(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Canonical component record produced by the normalizer.
///
/// `name` is trimmed and lower-cased; `version` keeps the display form.
/// `purl` and `cpe` are `None` rather than empty strings when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,
    pub purl: Option<String>,
    pub cpe: Option<String>,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    /// Scanner-local reference used by relationship edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    pub source_scanners: BTreeSet<ScannerId>,
}

impl Component {
    /// Create a library component with normalized name and version.
    pub fn new(name: impl AsRef<str>, version: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_lowercase(),
            version: version.as_ref().trim().to_string(),
            purl: None,
            cpe: None,
            component_type: "library".to_string(),
            description: None,
            licenses: Vec::new(),
            bom_ref: None,
            source_scanners: BTreeSet::new(),
        }
    }

    /// Set the PURL; blank values become `None`.
    #[must_use]
    pub fn with_purl(mut self, purl: Option<&str>) -> Self {
        self.purl = non_blank(purl);
        self
    }

    /// Set the CPE; blank values become `None`.
    #[must_use]
    pub fn with_cpe(mut self, cpe: Option<&str>) -> Self {
        self.cpe = non_blank(cpe);
        self
    }

    #[must_use]
    pub fn with_type(mut self, component_type: Option<&str>) -> Self {
        if let Some(t) = non_blank(component_type) {
            self.component_type = t.to_lowercase();
        }
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<&str>) -> Self {
        self.description = non_blank(description);
        self
    }

    #[must_use]
    pub fn with_licenses<I, S>(mut self, licenses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for license in licenses {
            let license = license.as_ref().trim();
            if !license.is_empty() && !self.licenses.iter().any(|l| l == license) {
                self.licenses.push(license.to_string());
            }
        }
        self
    }

    #[must_use]
    pub fn with_bom_ref(mut self, bom_ref: Option<&str>) -> Self {
        self.bom_ref = non_blank(bom_ref);
        self
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: ScannerId) -> Self {
        self.source_scanners.insert(scanner);
        self
    }

    /// Identity key `(name, version)`
    #[must_use]
    pub fn key(&self) -> ComponentKey {
        ComponentKey {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Version with build metadata (`+...`) removed, used only for matching.
    #[must_use]
    pub fn match_version(&self) -> &str {
        strip_build_metadata(&self.version)
    }

    /// Number of populated enrichment identifiers (purl, cpe).
    #[must_use]
    pub fn richness(&self) -> usize {
        usize::from(self.purl.is_some()) + usize::from(self.cpe.is_some())
    }

    /// Fill missing purl/cpe from another record of the same identity.
    pub fn absorb_identifiers(&mut self, other: &Self) {
        if self.purl.is_none() {
            self.purl.clone_from(&other.purl);
        }
        if self.cpe.is_none() {
            self.cpe.clone_from(&other.cpe);
        }
        if self.description.is_none() {
            self.description.clone_from(&other.description);
        }
        if self.licenses.is_empty() {
            self.licenses.clone_from(&other.licenses);
        }
        self.source_scanners
            .extend(other.source_scanners.iter().cloned());
    }

    /// Ecosystem (purl type) if a purl is present
    #[must_use]
    pub fn ecosystem(&self) -> Option<&str> {
        self.purl
            .as_deref()
            .and_then(|p| p.strip_prefix("pkg:"))
            .and_then(|rest| rest.split('/').next())
            .filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}@{}", self.name, self.version)
        }
    }
}

/// Strip semver build metadata from a version string.
#[must_use]
pub fn strip_build_metadata(version: &str) -> &str {
    version.split_once('+').map_or(version, |(core, _)| core)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Declared relationship between two scanner-local references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    /// Relationship type as declared by the source schema, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Relationship {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: Option<String>) -> Self {
        self.kind = kind;
        self
    }
}

/// One scanner's output after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedSbom {
    pub scanner: ScannerId,
    pub format: SchemaFamily,
    pub spec_version: Option<String>,
    pub components: Vec<Component>,
    pub relationships: Vec<Relationship>,
    /// Ecosystem / language tags the scanner declared (lower-case)
    pub ecosystems: BTreeSet<String>,
}

impl NormalizedSbom {
    #[must_use]
    pub fn new(scanner: ScannerId, format: SchemaFamily) -> Self {
        Self {
            scanner,
            format,
            spec_version: None,
            components: Vec::new(),
            relationships: Vec::new(),
            ecosystems: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Find a component by its scanner-local reference or purl.
    #[must_use]
    pub fn find_by_ref(&self, reference: &str) -> Option<&Component> {
        self.components.iter().find(|c| {
            c.bom_ref.as_deref() == Some(reference) || c.purl.as_deref() == Some(reference)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_normalizes_name() {
        let comp = Component::new("  Lodash ", " 4.17.21 ");
        assert_eq!(comp.name, "lodash");
        assert_eq!(comp.version, "4.17.21");
    }

    #[test]
    fn test_blank_identifiers_become_none() {
        let comp = Component::new("a", "1").with_purl(Some("  ")).with_cpe(None);
        assert!(comp.purl.is_none());
        assert!(comp.cpe.is_none());
        assert_eq!(comp.richness(), 0);
    }

    #[test]
    fn test_match_version_strips_build_metadata() {
        let comp = Component::new("a", "1.2.3+build.7");
        assert_eq!(comp.match_version(), "1.2.3");
        assert_eq!(comp.version, "1.2.3+build.7");
    }

    #[test]
    fn test_ecosystem_from_purl() {
        let comp = Component::new("lodash", "4.17.21").with_purl(Some("pkg:npm/lodash@4.17.21"));
        assert_eq!(comp.ecosystem(), Some("npm"));
    }

    #[test]
    fn test_absorb_identifiers_keeps_existing() {
        let mut a = Component::new("x", "1").with_purl(Some("pkg:npm/x@1"));
        let b = Component::new("x", "1")
            .with_purl(Some("pkg:npm/other@1"))
            .with_cpe(Some("cpe:2.3:a:x:x:1:*:*:*:*:*:*:*"));
        a.absorb_identifiers(&b);
        assert_eq!(a.purl.as_deref(), Some("pkg:npm/x@1"));
        assert!(a.cpe.is_some());
    }
}
