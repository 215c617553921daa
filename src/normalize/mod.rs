//! Scanner output normalization.
//!
//! Converts each scanner's raw document into canonical [`Component`] records.
//! Four schema families are understood: CycloneDX, SPDX 2.x, Syft native and
//! Trivy native JSON. The family is taken from the scanner registry when it is
//! set and otherwise detected from document markers.
//!
//! ```
//! use sbom_reconcile::model::{ScannerId, SchemaFamily};
//! use sbom_reconcile::normalize::Normalizer;
//! use serde_json::json;
//!
//! let doc = json!({
//!     "bomFormat": "CycloneDX",
//!     "specVersion": "1.5",
//!     "components": [{"name": "Lodash", "version": "4.17.21"}]
//! });
//! let sbom = Normalizer::new()
//!     .normalize(&ScannerId::syft(), SchemaFamily::Auto, &doc)
//!     .unwrap();
//! assert_eq!(sbom.components[0].name, "lodash");
//! ```

mod cyclonedx;
mod detection;
mod spdx;
mod syft;
pub mod tech_stack;
mod trivy;

pub use cyclonedx::CycloneDxAdapter;
pub use detection::FormatConfidence;
pub use spdx::SpdxAdapter;
pub use syft::SyftAdapter;
pub use tech_stack::{detect_repository_tech_stack, ecosystem_tag};
pub use trivy::TrivyAdapter;

use crate::error::{NormalizationErrorKind, ReconcileError, Result};
use crate::model::{ComponentKey, NormalizedSbom, ScannerId, SchemaFamily};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One schema family's detector and extractor.
///
/// Adding a schema family means implementing this trait and registering the
/// adapter with [`Normalizer::with_adapter`].
pub trait SchemaAdapter: Send + Sync {
    /// Schema family handled by this adapter
    fn family(&self) -> SchemaFamily;

    /// Confidence that this adapter understands the document
    fn detect(&self, doc: &Map<String, Value>) -> FormatConfidence;

    /// Extract components and relationships without de-duplication.
    fn extract(&self, doc: &Value, scanner: &ScannerId) -> Result<NormalizedSbom>;
}

/// Dispatches raw documents to schema adapters and cleans up the result.
pub struct Normalizer {
    adapters: Vec<Box<dyn SchemaAdapter>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Normalizer with the built-in CycloneDX, SPDX, Syft and Trivy adapters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(CycloneDxAdapter),
                Box::new(SpdxAdapter),
                Box::new(SyftAdapter),
                Box::new(TrivyAdapter),
            ],
        }
    }

    /// Register an additional adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Box<dyn SchemaAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Normalize a JSON string.
    pub fn normalize_str(
        &self,
        scanner: &ScannerId,
        hint: SchemaFamily,
        content: &str,
    ) -> Result<NormalizedSbom> {
        let doc: Value = serde_json::from_str(content).map_err(|e| {
            ReconcileError::normalization(
                format!("output of {scanner}"),
                NormalizationErrorKind::InvalidJson(e.to_string()),
            )
        })?;
        self.normalize(scanner, hint, &doc)
    }

    /// Normalize one scanner's document.
    ///
    /// A non-`Auto` hint is tried first; if that adapter does not recognize
    /// the document, detection falls back to every adapter.
    pub fn normalize(
        &self,
        scanner: &ScannerId,
        hint: SchemaFamily,
        doc: &Value,
    ) -> Result<NormalizedSbom> {
        let doc = envelope_body(doc);
        let Some(object) = doc.as_object() else {
            return Err(ReconcileError::normalization(
                format!("output of {scanner}"),
                NormalizationErrorKind::InvalidStructure("top-level value is not an object".into()),
            ));
        };

        let adapter = self
            .hinted(hint, object)
            .or_else(|| self.detect(object))
            .ok_or_else(|| ReconcileError::unknown_schema(format!("output of {scanner}")))?;

        tracing::debug!(
            scanner = %scanner,
            family = %adapter.family(),
            "Normalizing scanner output"
        );

        let sbom = adapter.extract(doc, scanner)?;
        Ok(deduplicate(sbom))
    }

    /// Detect the best adapter for a document.
    #[must_use]
    pub fn detect_family(&self, doc: &Value) -> Option<SchemaFamily> {
        envelope_body(doc)
            .as_object()
            .and_then(|o| self.detect(o))
            .map(|a| a.family())
    }

    fn hinted(&self, hint: SchemaFamily, doc: &Map<String, Value>) -> Option<&dyn SchemaAdapter> {
        if hint == SchemaFamily::Auto {
            return None;
        }
        self.adapters
            .iter()
            .find(|a| a.family() == hint && a.detect(doc).can_extract())
            .map(|a| a.as_ref())
    }

    fn detect(&self, doc: &Map<String, Value>) -> Option<&dyn SchemaAdapter> {
        let mut best: Option<(&dyn SchemaAdapter, FormatConfidence)> = None;
        for adapter in &self.adapters {
            let confidence = adapter.detect(doc);
            if !confidence.can_extract() {
                continue;
            }
            if best.map_or(true, |(_, c)| confidence > c) {
                best = Some((adapter.as_ref(), confidence));
            }
        }
        best.map(|(a, _)| a)
    }
}

/// Document inside an API envelope such as GitHub's `{"sbom": {...}}`;
/// the document itself when there is none.
fn envelope_body(doc: &Value) -> &Value {
    match doc.as_object() {
        Some(object) if object.len() == 1 => match object.get("sbom") {
            Some(inner) if inner.is_object() => inner,
            _ => doc,
        },
        _ => doc,
    }
}

/// Remove an API envelope so the stored document is the SBOM itself.
#[must_use]
pub fn strip_envelope(doc: Value) -> Value {
    match doc {
        Value::Object(mut object)
            if object.len() == 1 && object.get("sbom").is_some_and(Value::is_object) =>
        {
            object.remove("sbom").unwrap_or_default()
        }
        other => other,
    }
}

/// Collapse repeated `(name, version)` records within one scanner.
///
/// The first record wins; later duplicates only fill in missing identifiers.
/// Relationships that pointed at a dropped duplicate are re-pointed at the
/// surviving record and repeated edges are removed.
fn deduplicate(mut sbom: NormalizedSbom) -> NormalizedSbom {
    let before = sbom.components.len();
    let mut kept: IndexMap<ComponentKey, crate::model::Component> = IndexMap::new();
    let mut aliases: HashMap<String, String> = HashMap::new();

    for component in std::mem::take(&mut sbom.components) {
        match kept.get_mut(&component.key()) {
            Some(existing) => {
                if let Some(dup_ref) = &component.bom_ref {
                    match &existing.bom_ref {
                        Some(kept_ref) if kept_ref != dup_ref => {
                            aliases.insert(dup_ref.clone(), kept_ref.clone());
                        }
                        Some(_) => {}
                        None => existing.bom_ref = Some(dup_ref.clone()),
                    }
                }
                existing.absorb_identifiers(&component);
            }
            None => {
                kept.insert(component.key(), component);
            }
        }
    }
    sbom.components = kept.into_values().collect();

    let mut seen = HashSet::new();
    sbom.relationships = std::mem::take(&mut sbom.relationships)
        .into_iter()
        .map(|mut rel| {
            if let Some(target) = aliases.get(&rel.source) {
                rel.source.clone_from(target);
            }
            if let Some(target) = aliases.get(&rel.target) {
                rel.target.clone_from(target);
            }
            rel
        })
        .filter(|rel| seen.insert(rel.clone()))
        .collect();

    if before != sbom.components.len() {
        tracing::debug!(
            scanner = %sbom.scanner,
            before,
            after = sbom.components.len(),
            "Collapsed duplicate components"
        );
    }
    sbom
}
