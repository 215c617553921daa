//! Syft native JSON adapter.

use super::detection::{has_array, FormatConfidence};
use super::{ecosystem_tag, SchemaAdapter};
use crate::error::{NormalizationErrorKind, ReconcileError, Result};
use crate::model::{Component, NormalizedSbom, Relationship, ScannerId, SchemaFamily};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Reads `artifacts` and `artifactRelationships`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyftAdapter;

impl SchemaAdapter for SyftAdapter {
    fn family(&self) -> SchemaFamily {
        SchemaFamily::SyftJson
    }

    fn detect(&self, doc: &Map<String, Value>) -> FormatConfidence {
        if !has_array(doc, "artifacts") {
            return FormatConfidence::NONE;
        }
        let by_syft = doc
            .get("descriptor")
            .and_then(|d| d.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|n| n.eq_ignore_ascii_case("syft"));
        if by_syft {
            FormatConfidence::CERTAIN
        } else if doc.contains_key("artifactRelationships") {
            FormatConfidence::HIGH
        } else {
            FormatConfidence::LOW
        }
    }

    fn extract(&self, doc: &Value, scanner: &ScannerId) -> Result<NormalizedSbom> {
        let syft = SyftDocument::deserialize(doc).map_err(|e| {
            ReconcileError::normalization(
                format!("Syft document from {scanner}"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })?;

        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::SyftJson);
        sbom.spec_version = syft.schema.and_then(|s| s.version);

        for artifact in syft.artifacts {
            if let Some(tag) = artifact
                .language
                .as_deref()
                .or(artifact.package_type.as_deref())
                .and_then(ecosystem_tag)
            {
                sbom.ecosystems.insert(tag.to_string());
            }
            if let Some(component) = artifact.into_component(scanner) {
                sbom.components.push(component);
            }
        }

        for rel in syft.artifact_relationships {
            // "A dependency-of B" means B depends on A.
            let relationship = match rel.rel_type.as_str() {
                "dependency-of" => {
                    Relationship::new(rel.child, rel.parent).with_kind(Some("depends-on".into()))
                }
                other => Relationship::new(rel.parent, rel.child).with_kind(Some(other.into())),
            };
            sbom.relationships.push(relationship);
        }

        Ok(sbom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyftDocument {
    #[serde(default)]
    artifacts: Vec<SyftArtifact>,
    #[serde(default)]
    artifact_relationships: Vec<SyftRelationship>,
    schema: Option<SyftSchema>,
}

#[derive(Debug, Deserialize)]
struct SyftSchema {
    version: Option<String>,
}

/// Older schemas list plain strings, newer ones wrap them in objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrObject {
    Plain(String),
    Cpe { cpe: String },
    License { value: String },
}

impl StringOrObject {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Cpe { cpe: s } | Self::License { value: s } => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyftArtifact {
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "type")]
    package_type: Option<String>,
    language: Option<String>,
    purl: Option<String>,
    #[serde(default)]
    cpes: Vec<StringOrObject>,
    #[serde(default)]
    licenses: Vec<StringOrObject>,
}

impl SyftArtifact {
    fn into_component(self, scanner: &ScannerId) -> Option<Component> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        Some(
            Component::new(&name, self.version.as_deref().unwrap_or_default())
                .with_purl(self.purl.as_deref())
                .with_cpe(self.cpes.first().map(StringOrObject::as_str))
                .with_licenses(self.licenses.iter().map(StringOrObject::as_str))
                .with_bom_ref(self.id.as_deref())
                .with_scanner(scanner.clone()),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SyftRelationship {
    parent: String,
    child: String,
    #[serde(rename = "type")]
    rel_type: String,
}
