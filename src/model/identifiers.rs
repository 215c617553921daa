//! Stable node identifiers for components.
//!
//! Identification uses a tiered fallback:
//!
//! 1. **PURL** (Package URL) - most reliable, globally unique
//! 2. **CPE** (Common Platform Enumeration)
//! 3. **NameVersion** - `name@version`, always available

use super::Component;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of a node identifier, ordered by reliability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdSource {
    Purl,
    Cpe,
    NameVersion,
}

impl IdSource {
    /// Returns the reliability rank (lower is better)
    #[must_use]
    pub const fn reliability_rank(&self) -> u8 {
        match self {
            Self::Purl => 0,
            Self::Cpe => 1,
            Self::NameVersion => 2,
        }
    }
}

/// Identifier for a component node in a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    value: String,
    source: IdSource,
}

impl NodeId {
    /// Pick the best available identifier: purl, then cpe, then `name@version`.
    #[must_use]
    pub fn for_component(component: &Component) -> Self {
        if let Some(purl) = &component.purl {
            Self {
                value: purl.clone(),
                source: IdSource::Purl,
            }
        } else if let Some(cpe) = &component.cpe {
            Self {
                value: cpe.clone(),
                source: IdSource::Cpe,
            }
        } else {
            Self::from_name_version(&component.name, &component.version)
        }
    }

    /// Identifier built from name and version only.
    #[must_use]
    pub fn from_name_version(name: &str, version: &str) -> Self {
        let value = if version.is_empty() {
            name.to_string()
        } else {
            format!("{name}@{version}")
        };
        Self {
            value,
            source: IdSource::NameVersion,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn source(&self) -> IdSource {
        self.source
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
