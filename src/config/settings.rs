//! Local operator settings

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::endpoint::ProtocolVersion;
use crate::error::{Error, Result};
use crate::relation::RelationRole;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONFIG_FILE: &str = "/etc/karma/karma.yaml";
pub const DEFAULT_WORKLOAD_BINARY: &str = "/karma";
pub const DEFAULT_NAME: &str = "karma";

/// Where TLS material lands inside the workload container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsPaths {
    pub cert: String,
    pub key: String,
    /// CA bundle location picked up by `update-ca-certificates`
    pub ca: String,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            cert: "/etc/karma/karma.cert.pem".to_string(),
            key: "/etc/karma/karma.key.pem".to_string(),
            ca: "/usr/local/share/ca-certificates/karma-ca.crt".to_string(),
        }
    }
}

/// Static `log` section of the rendered document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub config: bool,
    pub level: String,
    pub format: String,
    pub requests: bool,
    pub timestamp: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            config: false,
            level: "info".to_string(),
            format: "text".to_string(),
            requests: false,
            timestamp: true,
        }
    }
}

/// Health poll policy applied after a restart
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub attempts: u32,
    /// Linear backoff step; attempt `n` waits `n * backoff_ms` first
    pub backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
            timeout_ms: 2000,
        }
    }
}

impl ProbeSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application name, also used for the Kubernetes Service
    pub app_name: String,
    /// Model (Kubernetes namespace) the application runs in
    pub model_name: String,
    pub container_name: String,
    pub service_name: String,
    pub layer_name: String,
    pub dashboard_role: String,
    pub ingress_role: String,
    pub port: u16,
    pub config_file: String,
    pub workload_binary: String,
    pub protocol: ProtocolVersion,
    pub web_external_url: Option<String>,
    pub external_hostname: Option<String>,
    pub tls: TlsPaths,
    pub log: LogOptions,
    pub probe: ProbeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_NAME.to_string(),
            model_name: "default".to_string(),
            container_name: DEFAULT_NAME.to_string(),
            service_name: DEFAULT_NAME.to_string(),
            layer_name: DEFAULT_NAME.to_string(),
            dashboard_role: RelationRole::Dashboard.to_string(),
            ingress_role: RelationRole::Ingress.to_string(),
            port: DEFAULT_PORT,
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            workload_binary: DEFAULT_WORKLOAD_BINARY.to_string(),
            protocol: ProtocolVersion::default(),
            web_external_url: None,
            external_hostname: None,
            tls: TlsPaths::default(),
            log: LogOptions::default(),
            probe: ProbeSettings::default(),
        }
    }
}

impl Settings {
    /// Path under which the dashboard is served, always `/`-delimited
    pub fn url_prefix(&self) -> Result<String> {
        let Some(external) = self
            .web_external_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
        else {
            return Ok("/".to_string());
        };

        let url = Url::parse(external).map_err(|e| {
            Error::ConfigError(format!("invalid web_external_url {external}: {e}"))
        })?;
        Ok(normalize_prefix(url.path()))
    }

    /// Hostname requested from the ingress provider
    pub fn service_hostname(&self) -> String {
        match self.external_hostname.as_deref().map(str::trim) {
            Some(hostname) if !hostname.is_empty() => hostname.to_string(),
            _ => format!("{}.juju", self.app_name),
        }
    }

    pub fn role_name(&self, role: RelationRole) -> &str {
        match role {
            RelationRole::Dashboard => &self.dashboard_role,
            RelationRole::Ingress => &self.ingress_role,
        }
    }

    /// Reject settings no pass could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::ConfigError("port must be non-zero".to_string()));
        }
        if self.probe.attempts == 0 {
            return Err(Error::ConfigError(
                "probe attempts must be at least 1".to_string(),
            ));
        }
        for (field, path) in [
            ("config_file", &self.config_file),
            ("tls.cert", &self.tls.cert),
            ("tls.key", &self.tls.key),
            ("tls.ca", &self.tls.ca),
        ] {
            if !path.starts_with('/') {
                return Err(Error::ConfigError(format!(
                    "{field} must be an absolute path, got {path:?}"
                )));
            }
        }
        if self.service_name.is_empty() || self.container_name.is_empty() {
            return Err(Error::ConfigError(
                "service and container names must be set".to_string(),
            ));
        }
        self.url_prefix()?;
        Ok(())
    }
}

/// `karma/ui` -> `/karma/ui/`, empty -> `/`
pub fn normalize_prefix(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
