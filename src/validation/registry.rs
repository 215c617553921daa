//! Package-registry existence checks for PURLs.

use super::{IdentifierKind, LookupAuthority};
use crate::error::{ReconcileError, Result};
use packageurl::PackageUrl;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::str::FromStr;
use std::time::Duration;

/// Registry URL that answers 2xx when the package (and version, if given)
/// exists and 404 when it does not. `None` for ecosystems without a
/// supported registry.
#[must_use]
pub fn registry_url(purl: &PackageUrl<'_>) -> Option<String> {
    let name = purl.name();
    let namespace = purl.namespace();
    let version = purl.version();

    let url = match purl.ty().to_ascii_lowercase().as_str() {
        "npm" => {
            let full = match namespace {
                Some(ns) => format!("{ns}%2F{name}"),
                None => name.to_string(),
            };
            match version {
                Some(v) => format!("https://registry.npmjs.org/{full}/{v}"),
                None => format!("https://registry.npmjs.org/{full}"),
            }
        }
        "pypi" => match version {
            Some(v) => format!("https://pypi.org/pypi/{name}/{v}/json"),
            None => format!("https://pypi.org/pypi/{name}/json"),
        },
        "cargo" => match version {
            Some(v) => format!("https://crates.io/api/v1/crates/{name}/{v}"),
            None => format!("https://crates.io/api/v1/crates/{name}"),
        },
        "gem" => match version {
            Some(v) => format!("https://rubygems.org/api/v2/rubygems/{name}/versions/{v}.json"),
            None => format!("https://rubygems.org/api/v1/gems/{name}.json"),
        },
        "golang" => {
            let module = match namespace {
                Some(ns) => format!("{ns}/{name}"),
                None => name.to_string(),
            };
            let module = escape_go_module(&module);
            match version {
                Some(v) => format!("https://proxy.golang.org/{module}/@v/{v}.info"),
                None => format!("https://proxy.golang.org/{module}/@v/list"),
            }
        }
        "maven" => {
            let group = namespace?.replace('.', "/");
            match version {
                Some(v) => format!(
                    "https://repo1.maven.org/maven2/{group}/{name}/{v}/{name}-{v}.pom"
                ),
                None => format!("https://repo1.maven.org/maven2/{group}/{name}/maven-metadata.xml"),
            }
        }
        _ => return None,
    };
    Some(url)
}

/// Go module proxy path escaping: upper-case letters become `!` + lower-case.
fn escape_go_module(module: &str) -> String {
    let mut escaped = String::with_capacity(module.len());
    for c in module.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Confirms PURLs against their public package registry.
pub struct RegistryPurlAuthority {
    client: Client,
}

impl RegistryPurlAuthority {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconcileError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl LookupAuthority for RegistryPurlAuthority {
    fn name(&self) -> &str {
        "package-registry"
    }

    fn supports(&self, kind: IdentifierKind) -> bool {
        kind == IdentifierKind::Purl
    }

    fn lookup(&self, _kind: IdentifierKind, identifier: &str) -> Result<bool> {
        let purl = PackageUrl::from_str(identifier)
            .map_err(|e| ReconcileError::validation_unavailable(identifier, e.to_string()))?;
        let Some(url) = registry_url(&purl) else {
            // No registry for this ecosystem: the syntactic result stands.
            return Ok(true);
        };

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ReconcileError::validation_unavailable(identifier, e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(ReconcileError::validation_unavailable(
                identifier,
                format!("{url} returned status {}", status.as_u16()),
            )),
        }
    }
}
