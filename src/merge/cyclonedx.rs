//! CycloneDX rendering of a merged SBOM.

use super::{MergedDependency, MergedSbom};
use chrono::Utc;
use serde::Serialize;

/// CycloneDX version of the exported document.
pub const CDX_SPEC_VERSION: &str = "1.4";

const PROPERTY_PREFIX: &str = "sbom-reconcile";

/// Top-level CycloneDX document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdxExport {
    pub bom_format: &'static str,
    pub spec_version: &'static str,
    pub version: u32,
    pub metadata: CdxMetadata,
    pub components: Vec<CdxComponent>,
    pub dependencies: Vec<MergedDependency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxMetadata {
    pub timestamp: String,
    pub tools: Vec<CdxTool>,
    pub properties: Vec<CdxProperty>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxTool {
    pub vendor: &'static str,
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxProperty {
    pub name: String,
    pub value: String,
}

impl CdxProperty {
    fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: format!("{PROPERTY_PREFIX}:{name}"),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxLicenseChoice {
    pub license: CdxLicense,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxLicense {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdxComponent {
    #[serde(rename = "bom-ref")]
    pub bom_ref: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<CdxLicenseChoice>,
    pub properties: Vec<CdxProperty>,
}

impl CdxExport {
    pub(super) fn from_merged(merged: &MergedSbom, scan_id: &str) -> Self {
        let components: Vec<CdxComponent> = merged
            .components
            .iter()
            .map(|mc| {
                let c = &mc.component;
                let scanners: Vec<&str> = c.source_scanners.iter().map(|s| s.as_str()).collect();
                CdxComponent {
                    bom_ref: mc.merged_ref(),
                    component_type: c.component_type.clone(),
                    name: c.name.clone(),
                    version: c.version.clone(),
                    purl: c.purl.clone(),
                    cpe: c.cpe.clone(),
                    description: c.description.clone(),
                    licenses: c
                        .licenses
                        .iter()
                        .map(|id| CdxLicenseChoice {
                            license: CdxLicense { id: id.clone() },
                        })
                        .collect(),
                    properties: vec![
                        CdxProperty::new("match_status", mc.match_status.as_str()),
                        CdxProperty::new("occurrence_count", mc.occurrence_count),
                        CdxProperty::new("scanner_name", scanners.join(",")),
                        CdxProperty::new("selected", mc.selected),
                    ],
                }
            })
            .collect();

        let selected = merged.components.iter().filter(|c| c.selected).count();
        Self {
            bom_format: "CycloneDX",
            spec_version: CDX_SPEC_VERSION,
            version: 1,
            metadata: CdxMetadata {
                timestamp: Utc::now().to_rfc3339(),
                tools: vec![CdxTool {
                    vendor: "sbom-reconcile",
                    name: env!("CARGO_PKG_NAME"),
                    version: env!("CARGO_PKG_VERSION"),
                }],
                properties: vec![
                    CdxProperty::new("scan_id", scan_id),
                    CdxProperty::new("total_components", components.len()),
                    CdxProperty::new("total_dependencies", merged.dependencies.len()),
                    CdxProperty::new("selected_unique", selected),
                ],
            },
            components,
            dependencies: merged.dependencies.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{MergeStatus, MergedComponent};
    use super::*;
    use crate::model::{Component, ScannerId};

    #[test]
    fn test_export_shape() {
        let merged = MergedSbom {
            components: vec![MergedComponent {
                component: Component::new("lodash", "4.17.21")
                    .with_purl(Some("pkg:npm/lodash@4.17.21"))
                    .with_licenses(["MIT"])
                    .with_scanner(ScannerId::trivy())
                    .with_scanner(ScannerId::syft()),
                selected: false,
                match_status: MergeStatus::Exact,
                occurrence_count: 2,
            }],
            dependencies: Vec::new(),
        };
        let doc = serde_json::to_value(merged.to_cyclonedx("scan-1")).unwrap();
        assert_eq!(doc["bomFormat"], "CycloneDX");
        assert_eq!(doc["specVersion"], "1.4");
        assert_eq!(doc["components"][0]["bom-ref"], "pkg:npm/lodash@4.17.21");
        assert_eq!(doc["components"][0]["licenses"][0]["license"]["id"], "MIT");
        let props = doc["metadata"]["properties"].as_array().unwrap();
        assert!(props
            .iter()
            .any(|p| p["name"] == "sbom-reconcile:scan_id" && p["value"] == "scan-1"));
        assert_eq!(
            doc["components"][0]["properties"][2]["value"],
            "syft,trivy"
        );
    }
}
