//! NVD CPE dictionary lookups.

use super::rate_limit::SlidingWindowLimiter;
use super::{IdentifierKind, LookupAuthority};
use crate::error::{ReconcileError, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Public NVD CPE API endpoint.
pub const NVD_CPE_API: &str = "https://services.nvd.nist.gov/rest/json/cpes/2.0";

const WINDOW: Duration = Duration::from_secs(30);
const REQUESTS_WITHOUT_KEY: usize = 5;
const REQUESTS_WITH_KEY: usize = 50;

/// NVD client configuration.
#[derive(Debug, Clone)]
pub struct NvdConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for NvdConfig {
    fn default() -> Self {
        Self {
            api_base: NVD_CPE_API.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CpeResponse {
    #[serde(default)]
    products: Vec<CpeProduct>,
}

#[derive(Debug, Deserialize)]
struct CpeProduct {
    cpe: CpeEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CpeEntry {
    cpe_name: String,
}

/// Confirms CPEs against the NVD dictionary (exact `cpeName` match).
pub struct NvdCpeAuthority {
    client: Client,
    config: NvdConfig,
    limiter: SlidingWindowLimiter,
}

impl NvdCpeAuthority {
    /// Build a client; the rate limit depends on whether an API key is set.
    pub fn new(config: NvdConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconcileError::config(format!("Failed to create HTTP client: {e}")))?;
        let per_window = if config.api_key.is_some() {
            REQUESTS_WITH_KEY
        } else {
            REQUESTS_WITHOUT_KEY
        };
        Ok(Self {
            client,
            config,
            limiter: SlidingWindowLimiter::new(per_window, WINDOW),
        })
    }

    #[must_use]
    pub const fn requests_per_window(&self) -> usize {
        self.limiter.max_requests()
    }
}

impl LookupAuthority for NvdCpeAuthority {
    fn name(&self) -> &str {
        "nvd"
    }

    fn supports(&self, kind: IdentifierKind) -> bool {
        kind == IdentifierKind::Cpe
    }

    fn lookup(&self, _kind: IdentifierKind, identifier: &str) -> Result<bool> {
        self.limiter.acquire();

        let mut request = self
            .client
            .get(&self.config.api_base)
            .query(&[("cpeMatchString", identifier)]);
        if let Some(key) = &self.config.api_key {
            request = request.header("apiKey", key);
        }
        let response = request
            .send()
            .map_err(|e| ReconcileError::validation_unavailable(identifier, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => {
                let body: CpeResponse = response.json().map_err(|e| {
                    ReconcileError::validation_unavailable(identifier, format!("bad NVD response: {e}"))
                })?;
                Ok(body.products.iter().any(|p| p.cpe.cpe_name == identifier))
            }
            status => Err(ReconcileError::validation_unavailable(
                identifier,
                format!("NVD returned status {}", status.as_u16()),
            )),
        }
    }
}
