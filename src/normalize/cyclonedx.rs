//! CycloneDX JSON adapter.

use super::detection::{has_array, str_field, FormatConfidence};
use super::{ecosystem_tag, SchemaAdapter};
use crate::error::{NormalizationErrorKind, ReconcileError, Result};
use crate::model::{Component, NormalizedSbom, Relationship, ScannerId, SchemaFamily};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Reads `components` (recursively), their identifiers and the `dependencies` graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycloneDxAdapter;

impl SchemaAdapter for CycloneDxAdapter {
    fn family(&self) -> SchemaFamily {
        SchemaFamily::CycloneDx
    }

    fn detect(&self, doc: &Map<String, Value>) -> FormatConfidence {
        match str_field(doc, "bomFormat") {
            Some(format) if format.eq_ignore_ascii_case("cyclonedx") => FormatConfidence::CERTAIN,
            Some(_) => FormatConfidence::NONE,
            None if doc.contains_key("specVersion") && has_array(doc, "components") => {
                FormatConfidence::MEDIUM
            }
            None => FormatConfidence::NONE,
        }
    }

    fn extract(&self, doc: &Value, scanner: &ScannerId) -> Result<NormalizedSbom> {
        let bom = CdxBom::deserialize(doc).map_err(|e| {
            ReconcileError::normalization(
                format!("CycloneDX document from {scanner}"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })?;

        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::CycloneDx);
        sbom.spec_version = bom.spec_version;

        let mut stack: Vec<CdxComponent> = bom.components.into_iter().rev().collect();
        while let Some(mut cdx) = stack.pop() {
            stack.extend(std::mem::take(&mut cdx.components).into_iter().rev());
            if let Some(component) = cdx.into_component(scanner) {
                if let Some(tag) = component.ecosystem().and_then(ecosystem_tag) {
                    sbom.ecosystems.insert(tag.to_string());
                }
                sbom.components.push(component);
            }
        }

        for dep in bom.dependencies {
            for target in dep.depends_on {
                sbom.relationships
                    .push(Relationship::new(dep.reference.clone(), target));
            }
        }

        Ok(sbom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxBom {
    spec_version: Option<String>,
    #[serde(default)]
    components: Vec<CdxComponent>,
    #[serde(default)]
    dependencies: Vec<CdxDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxComponent {
    #[serde(rename = "type")]
    component_type: Option<String>,
    #[serde(rename = "bom-ref")]
    bom_ref: Option<String>,
    name: Option<String>,
    version: Option<String>,
    purl: Option<String>,
    cpe: Option<String>,
    description: Option<String>,
    #[serde(default)]
    licenses: Vec<CdxLicenseChoice>,
    #[serde(default)]
    external_references: Vec<CdxExternalReference>,
    #[serde(default)]
    components: Vec<CdxComponent>,
}

impl CdxComponent {
    fn into_component(self, scanner: &ScannerId) -> Option<Component> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let cpe = self.cpe.filter(|c| !c.trim().is_empty()).or_else(|| {
            self.external_references
                .iter()
                .find(|r| matches!(r.ref_type.as_deref(), Some("cpe22Type" | "cpe23Type")))
                .and_then(|r| r.url.clone())
        });
        let licenses: Vec<String> = self
            .licenses
            .iter()
            .filter_map(CdxLicenseChoice::identifier)
            .collect();

        Some(
            Component::new(&name, self.version.as_deref().unwrap_or_default())
                .with_purl(self.purl.as_deref())
                .with_cpe(cpe.as_deref())
                .with_type(self.component_type.as_deref())
                .with_description(self.description.as_deref())
                .with_licenses(licenses)
                .with_bom_ref(self.bom_ref.as_deref())
                .with_scanner(scanner.clone()),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CdxLicenseChoice {
    license: Option<CdxLicense>,
    expression: Option<String>,
}

impl CdxLicenseChoice {
    fn identifier(&self) -> Option<String> {
        self.license
            .as_ref()
            .and_then(|l| l.id.clone().or_else(|| l.name.clone()))
            .or_else(|| self.expression.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CdxLicense {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdxExternalReference {
    #[serde(rename = "type")]
    ref_type: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxDependency {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(doc: &Value) -> NormalizedSbom {
        CycloneDxAdapter.extract(doc, &ScannerId::syft()).unwrap()
    }

    #[test]
    fn test_detect() {
        let doc = json!({"bomFormat": "CycloneDX", "specVersion": "1.5"});
        assert_eq!(
            CycloneDxAdapter.detect(doc.as_object().unwrap()),
            FormatConfidence::CERTAIN
        );
        let spdx = json!({"spdxVersion": "SPDX-2.3", "packages": []});
        assert_eq!(
            CycloneDxAdapter.detect(spdx.as_object().unwrap()),
            FormatConfidence::NONE
        );
    }

    #[test]
    fn test_extract_nested_components_and_cpe_reference() {
        let doc = json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.5",
            "components": [
                {
                    "type": "library",
                    "bom-ref": "pkg:npm/express@4.18.2",
                    "name": "Express",
                    "version": "4.18.2",
                    "purl": "pkg:npm/express@4.18.2",
                    "licenses": [{"license": {"id": "MIT"}}],
                    "components": [
                        {"name": "qs", "version": "6.11.0", "purl": "pkg:npm/qs@6.11.0"}
                    ]
                },
                {
                    "name": "openssl",
                    "version": "3.0.2",
                    "externalReferences": [
                        {"type": "website", "url": "https://openssl.org"},
                        {"type": "cpe23Type", "url": "cpe:2.3:a:openssl:openssl:3.0.2:*:*:*:*:*:*:*"}
                    ]
                },
                {"version": "1.0"}
            ],
            "dependencies": [
                {"ref": "pkg:npm/express@4.18.2", "dependsOn": ["pkg:npm/qs@6.11.0"]}
            ]
        });

        let sbom = extract(&doc);
        let names: Vec<_> = sbom.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["express", "qs", "openssl"]);
        assert_eq!(sbom.components[0].licenses, vec!["MIT"]);
        assert!(sbom.components[2].cpe.as_deref().unwrap().starts_with("cpe:2.3:a:openssl"));
        assert_eq!(sbom.relationships.len(), 1);
        assert!(sbom.ecosystems.contains("nodejs"));
        assert_eq!(sbom.spec_version.as_deref(), Some("1.5"));
    }

    #[test]
    fn test_wrong_field_type_is_normalization_error() {
        let doc = json!({"bomFormat": "CycloneDX", "components": "nope"});
        let err = CycloneDxAdapter
            .extract(&doc, &ScannerId::trivy())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Normalization { .. }));
    }
}
