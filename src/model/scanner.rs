//! Scanner identity and the data-driven scanner registry.
//!
//! Scanners are registered names, not a closed enum: adding a fourth scanner
//! means adding a row to the registry table (in code or in the config file),
//! and nothing in matching or analysis needs to change.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Registered scanner name (always lower-case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ScannerId(String);

impl ScannerId {
    /// Create a scanner id, normalizing to lower-case.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn trivy() -> Self {
        Self::new("trivy")
    }

    #[must_use]
    pub fn syft() -> Self {
        Self::new("syft")
    }

    #[must_use]
    pub fn cdxgen() -> Self {
        Self::new("cdxgen")
    }

    /// GitHub dependency graph
    #[must_use]
    pub fn ghas() -> Self {
        Self::new("ghas")
    }

    /// Get the scanner name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScannerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("invalid scanner name '{s}'"));
        }
        Ok(Self::new(trimmed))
    }
}

/// SBOM schema family a scanner emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaFamily {
    /// Detect from document markers
    #[default]
    Auto,
    /// CycloneDX JSON
    CycloneDx,
    /// SPDX 2.x JSON
    Spdx,
    /// Syft native JSON
    SyftJson,
    /// Trivy native JSON
    TrivyJson,
}

impl SchemaFamily {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::CycloneDx => "CycloneDX",
            Self::Spdx => "SPDX",
            Self::SyftJson => "syft-json",
            Self::TrivyJson => "trivy-json",
        }
    }
}

impl fmt::Display for SchemaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a scanner's SBOM comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ScannerSource {
    /// Run `command` against the checkout
    #[default]
    Command,
    /// Fetch GitHub's dependency-graph SBOM for the repository URL
    GithubDependencyGraph,
}

impl ScannerSource {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::GithubDependencyGraph => "github-dependency-graph",
        }
    }
}

impl fmt::Display for ScannerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the scanner registry: how to invoke a scanner and read its output.
///
/// `command` is an argv template. `{repo}` is replaced with the checked-out
/// repository path and `{output}` with the file the scanner must write to.
/// Rows with a non-command `source` leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScannerSpec {
    /// Registered scanner name
    pub id: ScannerId,
    /// How the SBOM is produced
    #[serde(default)]
    pub source: ScannerSource,
    /// Argument vector template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Per-run timeout in seconds
    #[serde(default = "default_scanner_timeout_secs")]
    pub timeout_secs: u64,
    /// Schema family of the scanner output
    #[serde(default)]
    pub schema: SchemaFamily,
}

const fn default_scanner_timeout_secs() -> u64 {
    5000
}

const GITHUB_FETCH_TIMEOUT_SECS: u64 = 30;

impl ScannerSpec {
    /// Create a spec from an argv template.
    pub fn new(id: ScannerId, command: &[&str], schema: SchemaFamily) -> Self {
        Self {
            id,
            source: ScannerSource::Command,
            command: command.iter().map(|s| (*s).to_string()).collect(),
            timeout_secs: default_scanner_timeout_secs(),
            schema,
        }
    }

    /// A scanner backed by GitHub's dependency graph (SPDX output).
    pub fn github_dependency_graph(id: ScannerId) -> Self {
        Self {
            id,
            source: ScannerSource::GithubDependencyGraph,
            command: Vec::new(),
            timeout_secs: GITHUB_FETCH_TIMEOUT_SECS,
            schema: SchemaFamily::Spdx,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run timeout as a Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Render the argv with placeholders substituted.
    #[must_use]
    pub fn render_command(&self, repo: &str, output: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace("{repo}", repo).replace("{output}", output))
            .collect()
    }
}

/// Table of registered scanners, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerRegistry {
    specs: IndexMap<ScannerId, ScannerSpec>,
}

impl ScannerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn empty() -> Self {
        Self {
            specs: IndexMap::new(),
        }
    }

    /// Build a registry from a list of specs. Later duplicates replace earlier ones.
    pub fn from_specs(specs: impl IntoIterator<Item = ScannerSpec>) -> Self {
        let mut registry = Self::empty();
        for spec in specs {
            registry.register(spec);
        }
        registry
    }

    /// The stock trivy / syft / cdxgen table.
    #[must_use]
    pub fn default_specs() -> Vec<ScannerSpec> {
        vec![
            ScannerSpec::new(
                ScannerId::trivy(),
                &["trivy", "fs", "--format", "cyclonedx", "--output", "{output}", "{repo}"],
                SchemaFamily::CycloneDx,
            ),
            ScannerSpec::new(
                ScannerId::syft(),
                &["syft", "{repo}", "--output", "cyclonedx-json={output}"],
                SchemaFamily::CycloneDx,
            ),
            ScannerSpec::new(
                ScannerId::cdxgen(),
                &["cdxgen", "-o", "{output}", "-r", "{repo}"],
                SchemaFamily::CycloneDx,
            ),
        ]
    }

    /// Register or replace a scanner.
    pub fn register(&mut self, spec: ScannerSpec) {
        self.specs.insert(spec.id.clone(), spec);
    }

    /// Look up a scanner by id
    #[must_use]
    pub fn get(&self, id: &ScannerId) -> Option<&ScannerSpec> {
        self.specs.get(id)
    }

    /// Look up a scanner by (case-insensitive) name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ScannerSpec> {
        self.specs.get(&ScannerId::new(name))
    }

    /// Registered ids in dispatch order
    pub fn ids(&self) -> impl Iterator<Item = &ScannerId> {
        self.specs.keys()
    }

    /// All specs in dispatch order
    pub fn specs(&self) -> impl Iterator<Item = &ScannerSpec> {
        self.specs.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::from_specs(Self::default_specs())
    }
}
