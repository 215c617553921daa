//! SPDX 2.x JSON adapter.

use super::detection::{has_array, str_field, FormatConfidence};
use super::{ecosystem_tag, SchemaAdapter};
use crate::error::{NormalizationErrorKind, ReconcileError, Result};
use crate::model::{Component, NormalizedSbom, Relationship, ScannerId, SchemaFamily};
use serde::Deserialize;
use serde_json::{Map, Value};

const DOCUMENT_REF: &str = "SPDXRef-DOCUMENT";

/// Reads `packages`, their `externalRefs` and package-to-package `relationships`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpdxAdapter;

impl SchemaAdapter for SpdxAdapter {
    fn family(&self) -> SchemaFamily {
        SchemaFamily::Spdx
    }

    fn detect(&self, doc: &Map<String, Value>) -> FormatConfidence {
        match str_field(doc, "spdxVersion") {
            Some(v) if v.starts_with("SPDX-2") => FormatConfidence::CERTAIN,
            Some(_) => FormatConfidence::MEDIUM,
            None if doc.contains_key("SPDXID") && has_array(doc, "packages") => {
                FormatConfidence::MEDIUM
            }
            None => FormatConfidence::NONE,
        }
    }

    fn extract(&self, doc: &Value, scanner: &ScannerId) -> Result<NormalizedSbom> {
        let spdx = SpdxDocument::deserialize(doc).map_err(|e| {
            ReconcileError::normalization(
                format!("SPDX document from {scanner}"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })?;

        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::Spdx);
        sbom.spec_version = spdx
            .spdx_version
            .as_deref()
            .map(|v| v.trim_start_matches("SPDX-").to_string());

        for package in spdx.packages {
            if let Some(component) = package.into_component(scanner) {
                if let Some(tag) = component.ecosystem().and_then(ecosystem_tag) {
                    sbom.ecosystems.insert(tag.to_string());
                }
                sbom.components.push(component);
            }
        }

        for rel in spdx.relationships {
            if rel.spdx_element_id == DOCUMENT_REF || rel.related_spdx_element == DOCUMENT_REF {
                continue;
            }
            let kind = rel.relationship_type.to_ascii_uppercase();
            let relationship = match kind.as_str() {
                "DEPENDS_ON" => Relationship::new(rel.spdx_element_id, rel.related_spdx_element)
                    .with_kind(Some("depends-on".to_string())),
                "DEPENDENCY_OF" => Relationship::new(rel.related_spdx_element, rel.spdx_element_id)
                    .with_kind(Some("depends-on".to_string())),
                other => Relationship::new(rel.spdx_element_id, rel.related_spdx_element)
                    .with_kind(Some(other.to_lowercase().replace('_', "-"))),
            };
            sbom.relationships.push(relationship);
        }

        Ok(sbom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxDocument {
    spdx_version: Option<String>,
    #[serde(default)]
    packages: Vec<SpdxPackage>,
    #[serde(default)]
    relationships: Vec<SpdxRelationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxPackage {
    #[serde(rename = "SPDXID")]
    spdx_id: Option<String>,
    name: Option<String>,
    version_info: Option<String>,
    primary_package_purpose: Option<String>,
    description: Option<String>,
    license_concluded: Option<String>,
    license_declared: Option<String>,
    #[serde(default)]
    external_refs: Vec<SpdxExternalRef>,
}

impl SpdxPackage {
    fn into_component(self, scanner: &ScannerId) -> Option<Component> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let mut purl = None;
        let mut cpe = None;
        for ext in &self.external_refs {
            match ext.reference_type.as_deref() {
                Some("purl") if purl.is_none() => purl = ext.reference_locator.as_deref(),
                Some("cpe22Type" | "cpe23Type") if cpe.is_none() => {
                    cpe = ext.reference_locator.as_deref();
                }
                _ => {}
            }
        }
        let licenses = [&self.license_concluded, &self.license_declared]
            .into_iter()
            .flatten()
            .filter(|l| !matches!(l.as_str(), "NOASSERTION" | "NONE"))
            .map(String::as_str);

        Some(
            Component::new(&name, self.version_info.as_deref().unwrap_or_default())
                .with_purl(purl)
                .with_cpe(cpe)
                .with_type(self.primary_package_purpose.as_deref())
                .with_description(self.description.as_deref())
                .with_licenses(licenses)
                .with_bom_ref(self.spdx_id.as_deref())
                .with_scanner(scanner.clone()),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxExternalRef {
    reference_type: Option<String>,
    reference_locator: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxRelationship {
    spdx_element_id: String,
    relationship_type: String,
    related_spdx_element: String,
}
