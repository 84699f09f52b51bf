//! Push config, restart the dashboard service and wait for it to answer

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::state::OperatorState;
use crate::config::{ProbeSettings, RenderedConfig, Settings};
use crate::error::{Error, Result};
use crate::workload::{parse_version_output, Container, HealthProbe};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Config, layer and process were already as desired
    Unchanged,
    /// The service was (re)started and passed its health check
    Restarted,
}

pub struct ServiceController {
    container: Arc<dyn Container>,
    probe: Arc<dyn HealthProbe>,
    service_name: String,
    config_file: String,
    workload_binary: String,
    policy: ProbeSettings,
}

impl ServiceController {
    pub fn new(
        container: Arc<dyn Container>,
        probe: Arc<dyn HealthProbe>,
        settings: &Settings,
    ) -> Self {
        Self {
            container,
            probe,
            service_name: settings.service_name.clone(),
            config_file: settings.config_file.clone(),
            workload_binary: settings.workload_binary.clone(),
            policy: settings.probe.clone(),
        }
    }

    /// Make sure the service runs `rendered`
    ///
    /// Nothing is touched when the stored hash matches, `restart_required`
    /// is false and the service is running. Otherwise the document is
    /// pushed (when its hash differs or the process is down), the stored
    /// hash is updated and the service is restarted and polled.
    ///
    /// Fails with [`Error::ServiceMissing`] when the plan has no such
    /// service yet and with [`Error::Unhealthy`] when every poll failed.
    #[instrument(skip_all, fields(service = %self.service_name))]
    pub async fn ensure_running(
        &self,
        state: &mut OperatorState,
        rendered: &RenderedConfig,
        restart_required: bool,
        running: bool,
    ) -> Result<RestartOutcome> {
        let hash_current = state.config_hash.as_deref() == Some(rendered.hash.as_str());
        if hash_current && !restart_required && running {
            debug!("Config, layer and service are current");
            return Ok(RestartOutcome::Unchanged);
        }

        if !hash_current || !running {
            self.container
                .push(&self.config_file, rendered.as_bytes())
                .await?;
            info!("Pushed config {} ({})", self.config_file, short(&rendered.hash));
            state.config_hash = Some(rendered.hash.clone());
        }

        self.restart(running).await?;
        self.wait_healthy().await?;
        Ok(RestartOutcome::Restarted)
    }

    async fn restart(&self, running: bool) -> Result<()> {
        if self.container.get_service(&self.service_name).await?.is_none() {
            error!("Cannot (re)start service: service does not (yet) exist");
            return Err(Error::ServiceMissing(self.service_name.clone()));
        }

        if running {
            info!("Restarting service {}", self.service_name);
            self.container.restart(&self.service_name).await
        } else {
            info!("Starting service {}", self.service_name);
            self.container.start(&self.service_name).await
        }
    }

    /// Poll the probe, waiting `n * backoff` before attempt `n`
    async fn wait_healthy(&self) -> Result<()> {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            tokio::time::sleep(self.policy.backoff() * attempt).await;
            match self.probe.check_health().await {
                Ok(()) => {
                    debug!("Service healthy after {} attempt(s)", attempt);
                    return Ok(());
                }
                Err(e) => warn!("Health check {}/{} failed: {}", attempt, attempts, e),
            }
        }
        error!("Service restarted but karma server does not respond");
        Err(Error::Unhealthy { attempts })
    }

    /// Running workload version, from the HTTP API or `<binary> --version`
    pub async fn workload_version(&self) -> Option<String> {
        match self.probe.version().await {
            Ok(version) => return Some(version),
            Err(e) => debug!("Version query failed, falling back to binary: {}", e),
        }

        let argv = vec![self.workload_binary.clone(), "--version".to_string()];
        match self.container.exec(&argv).await {
            Ok(output) if output.exit_code == 0 => {
                let version = parse_version_output(&output.stdout)
                    .or_else(|| parse_version_output(&output.stderr));
                if version.is_none() {
                    warn!("Could not parse version from {:?}", output.stdout.trim());
                }
                version
            }
            Ok(output) => {
                warn!(
                    "{} --version exited with {}",
                    self.workload_binary, output.exit_code
                );
                None
            }
            Err(e) => {
                warn!("Could not determine workload version: {}", e);
                None
            }
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
