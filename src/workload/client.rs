//! HTTP client for the Karma web server
//!
//! Karma answers `GET /health` with `200 Pong\n` once it is serving, and
//! `GET /version` with a small JSON document such as
//! `{"version": "v0.90", "golang": "go1.16.7"}`.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Exact body of a healthy `/health` response
pub const HEALTHY_BODY: &str = "Pong\n";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness and version queries against the running workload
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_health(&self) -> Result<()>;

    /// Version string without the leading `v`
    async fn version(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
}

#[derive(Debug, Clone)]
pub struct KarmaClient {
    http_client: Client,
    base_url: Url,
}

impl KarmaClient {
    /// Client for a server at `base_url`; routes are resolved relative to it,
    /// so a base carrying a path prefix must end with `/`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("invalid workload URL {base_url}: {e}")))?;

        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("karma-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpError)?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Client for the workload listening on localhost under `prefix`
    pub fn local(port: u16, prefix: &str, timeout: Duration) -> Result<Self> {
        Self::new(&format!("http://localhost:{port}{prefix}"), timeout)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    async fn get(&self, route: &str) -> Result<String> {
        let url = self
            .base_url
            .join(route)
            .map_err(|e| Error::BadWorkloadResponse(format!("invalid route {route}: {e}")))?;

        debug!("GET {}", url);

        let resp = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::BadWorkloadResponse(format!("{url} unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::BadWorkloadResponse(format!(
                "HTTP {} from {}",
                resp.status(),
                url
            )));
        }

        resp.text()
            .await
            .map_err(|e| Error::BadWorkloadResponse(format!("unreadable body from {url}: {e}")))
    }
}

#[async_trait]
impl HealthProbe for KarmaClient {
    async fn check_health(&self) -> Result<()> {
        let body = self.get("health").await?;
        if body == HEALTHY_BODY {
            Ok(())
        } else {
            Err(Error::BadWorkloadResponse(format!(
                "unexpected health response: {body:?}"
            )))
        }
    }

    async fn version(&self) -> Result<String> {
        let body = self.get("version").await?;
        info!("version_info: {}", body.trim());

        let info: VersionInfo = serde_json::from_str(&body)
            .map_err(|e| Error::BadWorkloadResponse(format!("malformed version response: {e}")))?;

        Ok(info
            .version
            .strip_prefix('v')
            .unwrap_or(&info.version)
            .to_string())
    }
}

/// Extract the semantic version from `karma --version` output
pub fn parse_version_output(output: &str) -> Option<String> {
    let pattern = Regex::new(r"v(\d+\.\d+(?:\.\d+)?)").ok()?;
    pattern
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
