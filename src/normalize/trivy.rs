//! Trivy native JSON adapter.

use super::detection::{has_array, FormatConfidence};
use super::{ecosystem_tag, SchemaAdapter};
use crate::error::{NormalizationErrorKind, ReconcileError, Result};
use crate::model::{Component, NormalizedSbom, Relationship, ScannerId, SchemaFamily};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Reads `Results[].Packages` and their `DependsOn` lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrivyAdapter;

impl SchemaAdapter for TrivyAdapter {
    fn family(&self) -> SchemaFamily {
        SchemaFamily::TrivyJson
    }

    fn detect(&self, doc: &Map<String, Value>) -> FormatConfidence {
        let has_results = has_array(doc, "Results");
        match (doc.contains_key("SchemaVersion"), has_results) {
            (true, true) => FormatConfidence::CERTAIN,
            (false, true) if doc.contains_key("ArtifactName") => FormatConfidence::HIGH,
            (false, true) => FormatConfidence::LOW,
            _ => FormatConfidence::NONE,
        }
    }

    fn extract(&self, doc: &Value, scanner: &ScannerId) -> Result<NormalizedSbom> {
        let report = TrivyReport::deserialize(doc).map_err(|e| {
            ReconcileError::normalization(
                format!("Trivy report from {scanner}"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })?;

        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::TrivyJson);
        sbom.spec_version = report.schema_version.map(|v| v.to_string());

        for result in report.results {
            if !result.packages.is_empty() {
                if let Some(tag) = result.result_type.as_deref().and_then(ecosystem_tag) {
                    sbom.ecosystems.insert(tag.to_string());
                }
            }
            for package in result.packages {
                let Some(name) = package.name.filter(|n| !n.trim().is_empty()) else {
                    continue;
                };
                let version = package.version.unwrap_or_default();
                let bom_ref = package
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{name}@{version}"));
                for target in package.depends_on {
                    sbom.relationships
                        .push(Relationship::new(bom_ref.clone(), target));
                }
                let purl = package.identifier.and_then(|i| i.purl);
                sbom.components.push(
                    Component::new(&name, &version)
                        .with_purl(purl.as_deref())
                        .with_licenses(package.licenses)
                        .with_bom_ref(Some(bom_ref.as_str()))
                        .with_scanner(scanner.clone()),
                );
            }
        }

        Ok(sbom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyReport {
    schema_version: Option<u32>,
    #[serde(default)]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyResult {
    #[serde(rename = "Type")]
    result_type: Option<String>,
    #[serde(default)]
    packages: Vec<TrivyPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyPackage {
    #[serde(rename = "ID")]
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    identifier: Option<TrivyIdentifier>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    licenses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrivyIdentifier {
    #[serde(rename = "PURL")]
    purl: Option<String>,
}
