//! Supervisor layer for the dashboard service and the diff against the live plan

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::workload::{Container, Layer, Override, Plan, ServiceSpec, Startup};

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Layer running the dashboard binary against the rendered config file
pub fn desired_layer(settings: &Settings) -> Layer {
    let service = ServiceSpec {
        override_: Override::Replace,
        summary: "karma service".to_string(),
        startup: Startup::Enabled,
        command: settings.workload_binary.clone(),
        environment: BTreeMap::from([(
            CONFIG_FILE_ENV.to_string(),
            settings.config_file.clone(),
        )]),
    };

    Layer {
        summary: "karma layer".to_string(),
        description: "pebble config layer for karma".to_string(),
        services: BTreeMap::from([(settings.service_name.clone(), service)]),
    }
}

/// Only the command and environment matter; summary or startup edits do not
pub fn service_changed(desired: &ServiceSpec, observed: Option<&ServiceSpec>) -> bool {
    match observed {
        None => true,
        Some(observed) => {
            desired.command != observed.command || desired.environment != observed.environment
        }
    }
}

pub fn plan_changed(service_name: &str, desired: &Layer, observed: &Plan) -> bool {
    match desired.services.get(service_name) {
        Some(spec) => service_changed(spec, observed.services.get(service_name)),
        None => false,
    }
}

/// Keeps the named service in the container plan in line with the layer
pub struct PlanReconciler {
    container: Arc<dyn Container>,
    layer_name: String,
    service_name: String,
}

impl PlanReconciler {
    pub fn new(container: Arc<dyn Container>, settings: &Settings) -> Self {
        Self {
            container,
            layer_name: settings.layer_name.clone(),
            service_name: settings.service_name.clone(),
        }
    }

    /// Merge `desired` into the live plan when the service entry differs
    ///
    /// The layer is added with `combine`, so other services in the plan are
    /// left untouched. Returns whether the layer was applied.
    pub async fn reconcile(&self, desired: &Layer) -> Result<bool> {
        if !desired.services.contains_key(&self.service_name) {
            return Err(Error::ConfigError(format!(
                "layer {} does not define service {}",
                self.layer_name, self.service_name
            )));
        }

        let observed = self.container.get_plan().await?;
        if !plan_changed(&self.service_name, desired, &observed) {
            debug!("Plan for service {} is current", self.service_name);
            return Ok(false);
        }

        self.container
            .add_layer(&self.layer_name, desired, true)
            .await?;
        info!(
            "Applied layer {} for service {}",
            self.layer_name, self.service_name
        );
        Ok(true)
    }
}
