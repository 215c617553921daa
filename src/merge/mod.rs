//! Reconciled component list built from an analysis and a caller selection.
//!
//! Every common-package group contributes its representative. Unique
//! components are only included when the caller selects them (or when
//! [`MergeOptions::include_all_unique`] is set). Dependencies declared by any
//! scanner are re-linked onto merged component references where both ends
//! survived.

mod cyclonedx;

pub use cyclonedx::{CdxExport, CDX_SPEC_VERSION};

use crate::analysis::{AnalysisResult, NormalizedScan};
use crate::error::{ReconcileError, Result};
use crate::model::{Component, ComponentKey, ScannerId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Name fragments that mark GitHub Actions workflow packages.
const GITHUB_ACTION_PATTERNS: &[&str] = &["actions/", "github/", ".github/", "workflow/", "action-"];

/// A unique package chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedPackage {
    pub name: String,
    pub version: String,
}

impl SelectedPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    fn key(&self) -> ComponentKey {
        ComponentKey::new(&self.name, &self.version)
    }
}

/// Per-scanner selection of unique packages.
pub type UniqueSelection = BTreeMap<ScannerId, Vec<SelectedPackage>>;

/// Knobs for a merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Include every unique package, not just selected ones
    pub include_all_unique: bool,
    /// Drop unique packages that look like GitHub Actions workflow steps
    pub exclude_github_actions: bool,
}

/// Why a component made it into the merged list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    Exact,
    Fuzzy,
    Unique,
}

impl MergeStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Unique => "unique",
        }
    }
}

/// A merged component with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedComponent {
    #[serde(flatten)]
    pub component: Component,
    /// True when the component was a caller-selected unique package
    pub selected: bool,
    pub match_status: MergeStatus,
    /// Number of scanner records folded into this component
    pub occurrence_count: usize,
}

impl MergedComponent {
    /// Reference used in the merged document: purl, else `name@version`.
    #[must_use]
    pub fn merged_ref(&self) -> String {
        merged_ref(&self.component)
    }
}

fn merged_ref(component: &Component) -> String {
    component
        .purl
        .clone()
        .unwrap_or_else(|| format!("{}@{}", component.name, component.version))
}

/// One `ref -> dependsOn` entry over merged references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedDependency {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// Reconciled component list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedSbom {
    pub components: Vec<MergedComponent>,
    #[serde(default)]
    pub dependencies: Vec<MergedDependency>,
}

impl MergedSbom {
    /// Fold `other` into `self`, one record per `(name, version)`.
    ///
    /// Repeating the same merge adds nothing.
    pub fn merge_from(&mut self, other: &Self) {
        let mut index: IndexMap<ComponentKey, MergedComponent> = self
            .components
            .drain(..)
            .map(|c| (c.component.key(), c))
            .collect();
        for incoming in &other.components {
            match index.get_mut(&incoming.component.key()) {
                Some(existing) => {
                    existing.component.absorb_identifiers(&incoming.component);
                    existing.selected |= incoming.selected;
                    existing.match_status = existing.match_status.min(incoming.match_status);
                    existing.occurrence_count =
                        existing.occurrence_count.max(incoming.occurrence_count);
                }
                None => {
                    index.insert(incoming.component.key(), incoming.clone());
                }
            }
        }
        self.components = index.into_values().collect();

        let mut deps = dependency_map(&self.dependencies);
        for dep in &other.dependencies {
            deps.entry(dep.reference.clone())
                .or_default()
                .extend(dep.depends_on.iter().cloned());
        }
        self.dependencies = into_dependencies(deps);
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Keys of all merged components.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<ComponentKey> {
        self.components.iter().map(|c| c.component.key()).collect()
    }

    /// Render as a CycloneDX document.
    #[must_use]
    pub fn to_cyclonedx(&self, scan_id: &str) -> CdxExport {
        CdxExport::from_merged(self, scan_id)
    }
}

/// Builds [`MergedSbom`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    options: MergeOptions,
}

impl Merger {
    #[must_use]
    pub const fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Merge an analysis with a caller selection.
    ///
    /// `scan` supplies the per-scanner relationships that get re-linked; pass
    /// an empty [`NormalizedScan`] to skip dependencies.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownComponent`] when a selection names a package
    /// that is not unique to that scanner, and [`ReconcileError::UnknownScanner`]
    /// when the scanner has no unique list at all.
    pub fn merge(
        &self,
        analysis: &AnalysisResult,
        selection: &UniqueSelection,
        scan: &NormalizedScan,
    ) -> Result<MergedSbom> {
        let selected = resolve_selection(analysis, selection)?;

        let mut merged: IndexMap<ComponentKey, MergedComponent> = IndexMap::new();
        // (scanner, scanner-local key) -> merged reference
        let mut ref_map: HashMap<(ScannerId, ComponentKey), String> = HashMap::new();

        for (status, entries) in [
            (MergeStatus::Exact, &analysis.common_packages.exact),
            (MergeStatus::Fuzzy, &analysis.common_packages.fuzzy),
        ] {
            for entry in entries {
                let mut component = entry.representative.clone();
                component.source_scanners.extend(entry.found_in.iter().cloned());
                let reference = merged_ref(&component);
                for member in &entry.members {
                    for scanner in &member.source_scanners {
                        ref_map.insert((scanner.clone(), member.key()), reference.clone());
                    }
                }
                component.bom_ref = Some(reference);
                insert_merged(
                    &mut merged,
                    MergedComponent {
                        component,
                        selected: false,
                        match_status: status,
                        occurrence_count: entry.members.len(),
                    },
                );
            }
        }

        for (scanner, components) in &analysis.unique_packages {
            for component in components {
                let key = component.key();
                let chosen = self.options.include_all_unique
                    || selected.contains(&(scanner.clone(), key.clone()));
                if !chosen {
                    continue;
                }
                if self.options.exclude_github_actions && is_github_action_package(&component.name)
                {
                    tracing::debug!(component = %key, "Excluding GitHub Actions package");
                    continue;
                }
                let mut component = component.clone();
                component.source_scanners.insert(scanner.clone());
                let reference = merged_ref(&component);
                ref_map.insert((scanner.clone(), key), reference.clone());
                component.bom_ref = Some(reference);
                insert_merged(
                    &mut merged,
                    MergedComponent {
                        component,
                        selected: true,
                        match_status: MergeStatus::Unique,
                        occurrence_count: 1,
                    },
                );
            }
        }

        let dependencies = relink_dependencies(scan, &ref_map);
        let result = MergedSbom {
            components: merged.into_values().collect(),
            dependencies,
        };
        tracing::info!(
            components = result.components.len(),
            dependencies = result.dependencies.len(),
            selected = selected.len(),
            "Merged SBOM"
        );
        Ok(result)
    }
}

fn insert_merged(merged: &mut IndexMap<ComponentKey, MergedComponent>, incoming: MergedComponent) {
    let key = incoming.component.key();
    match merged.get_mut(&key) {
        Some(existing) => {
            existing.component.absorb_identifiers(&incoming.component);
            existing.selected |= incoming.selected;
            existing.occurrence_count += incoming.occurrence_count;
        }
        None => {
            merged.insert(key, incoming);
        }
    }
}

fn resolve_selection(
    analysis: &AnalysisResult,
    selection: &UniqueSelection,
) -> Result<BTreeSet<(ScannerId, ComponentKey)>> {
    let mut resolved = BTreeSet::new();
    for (scanner, packages) in selection {
        if packages.is_empty() {
            continue;
        }
        let Some(uniques) = analysis.unique_packages.get(scanner) else {
            if analysis.total_counts.contains_key(scanner) {
                let first = &packages[0];
                return Err(ReconcileError::UnknownComponent {
                    scanner: scanner.to_string(),
                    name: first.name.clone(),
                    version: first.version.clone(),
                });
            }
            return Err(ReconcileError::UnknownScanner(scanner.to_string()));
        };
        for package in packages {
            let key = package.key();
            if !uniques.iter().any(|c| c.key() == key) {
                return Err(ReconcileError::UnknownComponent {
                    scanner: scanner.to_string(),
                    name: package.name.clone(),
                    version: package.version.clone(),
                });
            }
            resolved.insert((scanner.clone(), key));
        }
    }
    Ok(resolved)
}

fn relink_dependencies(
    scan: &NormalizedScan,
    ref_map: &HashMap<(ScannerId, ComponentKey), String>,
) -> Vec<MergedDependency> {
    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut dropped = 0usize;

    for sbom in &scan.sboms {
        let mut local: HashMap<&str, String> = HashMap::new();
        for component in &sbom.components {
            let Some(reference) = ref_map.get(&(sbom.scanner.clone(), component.key())) else {
                continue;
            };
            if let Some(bom_ref) = &component.bom_ref {
                local.insert(bom_ref.as_str(), reference.clone());
            }
            if let Some(purl) = &component.purl {
                local.entry(purl.as_str()).or_insert_with(|| reference.clone());
            }
        }
        for rel in &sbom.relationships {
            match (local.get(rel.source.as_str()), local.get(rel.target.as_str())) {
                (Some(source), Some(target)) if source != target => {
                    deps.entry(source.clone()).or_default().insert(target.clone());
                }
                (Some(_), Some(_)) => {}
                _ => dropped += 1,
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "Dependencies not re-linked (endpoint not merged)");
    }
    into_dependencies(deps)
}

fn dependency_map(dependencies: &[MergedDependency]) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for dep in dependencies {
        map.entry(dep.reference.clone())
            .or_default()
            .extend(dep.depends_on.iter().cloned());
    }
    map
}

fn into_dependencies(map: BTreeMap<String, BTreeSet<String>>) -> Vec<MergedDependency> {
    map.into_iter()
        .map(|(reference, targets)| MergedDependency {
            reference,
            depends_on: targets.into_iter().collect(),
        })
        .collect()
}

/// Whether a package name looks like a GitHub Actions workflow step.
#[must_use]
pub fn is_github_action_package(name: &str) -> bool {
    let lower = name.to_lowercase();
    GITHUB_ACTION_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::model::{NormalizedSbom, Relationship, SchemaFamily};

    fn sbom(scanner: ScannerId, comps: &[(&str, &str)]) -> NormalizedSbom {
        let mut sbom = NormalizedSbom::new(scanner.clone(), SchemaFamily::CycloneDx);
        sbom.components = comps
            .iter()
            .map(|(n, v)| {
                Component::new(n, v)
                    .with_bom_ref(Some(format!("{n}@{v}").as_str()))
                    .with_scanner(scanner.clone())
            })
            .collect();
        sbom
    }

    fn fixture() -> (NormalizedScan, AnalysisResult) {
        let mut trivy = sbom(
            ScannerId::trivy(),
            &[("app", "1.0.0"), ("lodash", "4.17.21"), ("actions/checkout", "4")],
        );
        trivy
            .relationships
            .push(Relationship::new("app@1.0.0", "lodash@4.17.21"));
        let mut syft = sbom(ScannerId::syft(), &[("app", "1.0.0"), ("lodash", "4.17.21"), ("zlib", "1.3")]);
        syft.relationships.push(Relationship::new("app@1.0.0", "zlib@1.3"));
        let scan = NormalizedScan {
            sboms: vec![trivy, syft],
            failed: BTreeMap::new(),
        };
        let analysis = Analyzer::default().analyze(&scan, &BTreeSet::new());
        (scan, analysis)
    }

    #[test]
    fn test_merge_without_selection_keeps_common_only() {
        let (scan, analysis) = fixture();
        let merged = Merger::default()
            .merge(&analysis, &UniqueSelection::new(), &scan)
            .unwrap();
        assert_eq!(merged.component_count(), 2);
        assert!(merged.components.iter().all(|c| !c.selected));
        assert_eq!(merged.dependencies.len(), 1);
        assert_eq!(merged.dependencies[0].depends_on, vec!["lodash@4.17.21".to_string()]);
    }

    #[test]
    fn test_selected_unique_is_flagged_and_relinked() {
        let (scan, analysis) = fixture();
        let mut selection = UniqueSelection::new();
        selection.insert(ScannerId::syft(), vec![SelectedPackage::new("zlib", "1.3")]);
        let merged = Merger::default().merge(&analysis, &selection, &scan).unwrap();
        let zlib = merged
            .components
            .iter()
            .find(|c| c.component.name == "zlib")
            .unwrap();
        assert!(zlib.selected);
        assert_eq!(zlib.match_status, MergeStatus::Unique);
        assert_eq!(merged.dependencies[0].depends_on.len(), 2);
    }

    #[test]
    fn test_selected_unique_folded_into_common_entry_stays_selected() {
        let (scan, mut analysis) = fixture();
        analysis
            .unique_packages
            .entry(ScannerId::syft())
            .or_default()
            .push(Component::new("lodash", "4.17.21").with_scanner(ScannerId::syft()));
        let mut selection = UniqueSelection::new();
        selection.insert(ScannerId::syft(), vec![SelectedPackage::new("lodash", "4.17.21")]);

        let merged = Merger::default().merge(&analysis, &selection, &scan).unwrap();
        assert_eq!(merged.component_count(), 2);
        let lodash = merged
            .components
            .iter()
            .find(|c| c.component.name == "lodash")
            .unwrap();
        assert!(lodash.selected);
        assert_eq!(lodash.match_status, MergeStatus::Exact);
    }

    #[test]
    fn test_unknown_selection_rejected() {
        let (scan, analysis) = fixture();
        let mut selection = UniqueSelection::new();
        selection.insert(ScannerId::syft(), vec![SelectedPackage::new("lodash", "4.17.21")]);
        let err = Merger::default().merge(&analysis, &selection, &scan).unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownComponent { .. }));

        let mut selection = UniqueSelection::new();
        selection.insert(ScannerId::cdxgen(), vec![SelectedPackage::new("x", "1")]);
        let err = Merger::default().merge(&analysis, &selection, &scan).unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownScanner(_)));
    }

    #[test]
    fn test_exclude_github_actions() {
        let (scan, analysis) = fixture();
        let merger = Merger::new(MergeOptions {
            include_all_unique: true,
            exclude_github_actions: true,
        });
        let merged = merger.merge(&analysis, &UniqueSelection::new(), &scan).unwrap();
        assert!(merged.components.iter().any(|c| c.component.name == "zlib"));
        assert!(!merged
            .components
            .iter()
            .any(|c| c.component.name == "actions/checkout"));
    }

    #[test]
    fn test_merge_from_is_idempotent() {
        let (scan, analysis) = fixture();
        let merged = Merger::default()
            .merge(&analysis, &UniqueSelection::new(), &scan)
            .unwrap();
        let mut again = merged.clone();
        again.merge_from(&merged);
        assert_eq!(again.keys(), merged.keys());
        assert_eq!(again.component_count(), merged.component_count());
        assert_eq!(again.dependencies, merged.dependencies);
    }

    #[test]
    fn test_github_action_patterns() {
        assert!(is_github_action_package("actions/checkout"));
        assert!(is_github_action_package("Action-Setup"));
        assert!(!is_github_action_package("lodash"));
    }
}
