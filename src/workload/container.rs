//! Contract of the container supervisor running the dashboard process
//!
//! The supervisor accepts declarative layers, starts and stops named
//! services, moves files in and out of the workload container and runs
//! one-off commands. Everything this operator does to the workload goes
//! through [`Container`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a layer's service entry combines with an existing one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    #[default]
    Replace,
    Merge,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    #[default]
    Enabled,
    Disabled,
}

/// One service entry of a layer or plan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "override", default)]
    pub override_: Override,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub startup: Startup,
    pub command: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// A declarative layer added on top of the container plan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

/// The combined plan the supervisor is currently running from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Backoff,
    Error,
}

/// Runtime view of a service, as reported by the supervisor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub startup: Startup,
    pub current: ServiceStatus,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.current == ServiceStatus::Active
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[async_trait]
pub trait Container: Send + Sync {
    async fn can_connect(&self) -> bool;

    async fn push(&self, path: &str, content: &[u8]) -> Result<()>;

    /// File content, or `None` when the path does not exist
    async fn pull(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn remove(&self, path: &str) -> Result<()>;

    async fn get_plan(&self) -> Result<Plan>;

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()>;

    /// Runtime info for a service, or `None` when the plan has no such service
    async fn get_service(&self, name: &str) -> Result<Option<ServiceInfo>>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn restart(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.start(name).await
    }

    async fn exec(&self, argv: &[String]) -> Result<ExecOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_spec_yaml_shape() {
        let spec = ServiceSpec {
            summary: "karma service".to_string(),
            command: "/karma".to_string(),
            environment: [("CONFIG_FILE".to_string(), "/etc/karma/karma.yaml".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&spec).unwrap();
        assert!(yaml.contains("override: replace"));
        assert!(yaml.contains("startup: enabled"));
        assert!(yaml.contains("CONFIG_FILE: /etc/karma/karma.yaml"));
    }

    #[test]
    fn test_plan_from_yaml() {
        let plan: Plan = serde_yaml::from_str(
            "services:\n  karma:\n    override: replace\n    command: /karma\n",
        )
        .unwrap();
        let karma = &plan.services["karma"];
        assert_eq!(karma.command, "/karma");
        assert!(karma.environment.is_empty());
        assert_eq!(karma.startup, Startup::Enabled);
    }

    #[test]
    fn test_only_active_is_running() {
        let mut info = ServiceInfo {
            name: "karma".to_string(),
            startup: Startup::Enabled,
            current: ServiceStatus::Active,
        };
        assert!(info.is_running());
        info.current = ServiceStatus::Backoff;
        assert!(!info.is_running());
    }
}
