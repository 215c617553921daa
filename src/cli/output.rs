//! Input parsing and output routing shared by the command handlers.

use crate::model::ScannerId;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// Create output target from optional path
    #[must_use]
    pub fn from_option(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Stdout, Self::File)
    }
}

/// Serialize `value` as pretty JSON to the target.
pub fn write_json<T: Serialize>(value: &T, target: &OutputTarget) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match target {
        OutputTarget::Stdout => {
            println!("{content}");
            Ok(())
        }
        OutputTarget::File(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            tracing::info!("Output written to {}", path.display());
            Ok(())
        }
    }
}

/// One `scanner=path` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbomInput {
    pub scanner: ScannerId,
    pub path: PathBuf,
}

impl FromStr for SbomInput {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scanner, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected SCANNER=PATH, got '{s}'"))?;
        if path.is_empty() {
            return Err(format!("missing path for scanner '{scanner}'"));
        }
        Ok(Self {
            scanner: scanner.parse()?,
            path: PathBuf::from(path),
        })
    }
}

/// Read every input document. Each scanner may appear once.
pub fn load_documents(inputs: &[SbomInput]) -> Result<Vec<(ScannerId, serde_json::Value)>> {
    let mut documents: Vec<(ScannerId, serde_json::Value)> = Vec::with_capacity(inputs.len());
    for input in inputs {
        if documents.iter().any(|(s, _)| s == &input.scanner) {
            bail!("scanner '{}' given more than once", input.scanner);
        }
        let doc = read_json(&input.path)?;
        documents.push((input.scanner.clone(), doc));
    }
    Ok(documents)
}

/// Parse a JSON file.
pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Identifiers from arguments plus one-per-line file contents (blank lines
/// and `#` comments skipped).
pub fn collect_identifiers(args: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut identifiers = args.to_vec();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        identifiers.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    if identifiers.is_empty() {
        bail!("no identifiers given");
    }
    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_sbom_input() {
        let input: SbomInput = "Trivy=out/trivy.json".parse().unwrap();
        assert_eq!(input.scanner, ScannerId::trivy());
        assert_eq!(input.path, PathBuf::from("out/trivy.json"));

        assert!("trivy".parse::<SbomInput>().is_err());
        assert!("trivy=".parse::<SbomInput>().is_err());
        assert!("tri vy=x.json".parse::<SbomInput>().is_err());
    }

    #[test]
    fn test_duplicate_scanner_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let input = SbomInput {
            scanner: ScannerId::syft(),
            path: file.path().to_path_buf(),
        };
        assert_eq!(load_documents(&[input.clone()]).unwrap().len(), 1);
        assert!(load_documents(&[input.clone(), input]).is_err());
    }

    #[test]
    fn test_collect_identifiers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# purls\npkg:npm/a@1\n\npkg:npm/b@2").unwrap();
        let ids = collect_identifiers(&["pkg:npm/c@3".to_string()], Some(file.path())).unwrap();
        assert_eq!(ids, vec!["pkg:npm/c@3", "pkg:npm/a@1", "pkg:npm/b@2"]);
        assert!(collect_identifiers(&[], None).is_err());
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&serde_json::json!({"ok": true}), &OutputTarget::File(path.clone())).unwrap();
        let written = read_json(&path).unwrap();
        assert_eq!(written["ok"], true);
    }
}
