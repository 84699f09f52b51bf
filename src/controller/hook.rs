//! Single entry point for every event the operator reacts to
//!
//! Each call to [`ReconciliationHook::handle`] is one reconciliation pass:
//! load state, apply the event to it, walk the common exit path and save
//! state if it changed. The common exit path is level-triggered and
//! recomputes everything from current relation data, so replaying the
//! same event is harmless and a second pass with no external change
//! performs no writes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::plan::{desired_layer, PlanReconciler};
use super::service::{RestartOutcome, ServiceController};
use super::service_patch::ServicePatcher;
use super::state::{OperatorState, StateStore};
use crate::config::{render, Settings};
use crate::error::{Error, Result};
use crate::relation::{
    publish_ingress_request, publish_provider_info, EndpointAggregator, IngressRequest,
    ProviderInfo, RelationData, RelationId, RelationRole, RelationSource,
};
use crate::workload::{refresh_tls, Container, HealthProbe, TlsSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Install,
    ConfigChanged,
    Upgrade,
    PebbleReady,
    Start,
    Stop,
    UpdateStatus,
    CertificateChanged,
    IngressReady,
    IngressRevoked,
    RelationJoined { role: RelationRole, id: RelationId },
    RelationChanged { role: RelationRole, id: RelationId },
    RelationDeparted { role: RelationRole, id: RelationId },
    RelationBroken { role: RelationRole, id: RelationId },
}

/// Unit status at the end of a pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    WaitingForStartup,
    BlockedNoRelation,
    BlockedRestartFailed,
    BlockedPebbleError(String),
    Active,
}

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            Status::BlockedNoRelation | Status::BlockedRestartFailed | Status::BlockedPebbleError(_)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::WaitingForStartup => write!(f, "waiting for startup"),
            Status::BlockedNoRelation => write!(f, "blocked: waiting for relation"),
            Status::BlockedRestartFailed => write!(f, "blocked: service restart failed"),
            Status::BlockedPebbleError(reason) => write!(f, "blocked: pebble error: {reason}"),
            Status::Active => write!(f, "active"),
        }
    }
}

/// External systems a pass talks to
#[derive(Clone)]
pub struct Collaborators {
    pub container: Arc<dyn Container>,
    pub relations: Arc<dyn RelationSource>,
    pub probe: Arc<dyn HealthProbe>,
    pub tls: Arc<dyn TlsSource>,
    pub store: Arc<dyn StateStore>,
    /// Kubernetes Service patching, skipped when absent
    pub service_patcher: Option<Arc<dyn ServicePatcher>>,
}

pub struct ReconciliationHook {
    settings: Settings,
    deps: Collaborators,
    plan: PlanReconciler,
    service: ServiceController,
    leader: bool,
}

impl ReconciliationHook {
    pub fn new(settings: Settings, deps: Collaborators) -> Result<Self> {
        settings.validate()?;
        let plan = PlanReconciler::new(deps.container.clone(), &settings);
        let service =
            ServiceController::new(deps.container.clone(), deps.probe.clone(), &settings);
        Ok(Self {
            settings,
            deps,
            plan,
            service,
            leader: false,
        })
    }

    pub fn with_leadership(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn set_leader(&mut self, leader: bool) {
        self.leader = leader;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one reconciliation pass for `event`
    ///
    /// Failures of the workload end up in the returned [`Status`]. Errors
    /// are returned only for state storage, relation access and rendering,
    /// so the caller can retry the whole invocation after [`error_policy`].
    /// Whatever the pass already did to the workload is saved first.
    #[instrument(skip(self), fields(leader = self.leader))]
    pub async fn handle(&mut self, event: EventKind) -> Result<Status> {
        let mut state = self.deps.store.load().await?;
        let loaded = state.clone();

        self.apply_event(&mut state, event).await;
        let result = self.common_exit(&mut state).await;

        if !state.same_content(&loaded) {
            state.updated_at = Some(Utc::now());
            self.deps.store.save(&state).await?;
            debug!("Saved operator state");
        }

        match result {
            Ok(status) => {
                info!("Status: {}", status);
                Ok(status)
            }
            Err(e) => {
                let retry_after = error_policy(&e);
                error!("Reconciliation failed, retry in {:?}: {}", retry_after, e);
                Err(e)
            }
        }
    }

    async fn apply_event(&self, state: &mut OperatorState, event: EventKind) {
        match event {
            EventKind::Install | EventKind::Upgrade => self.patch_k8s_service().await,
            EventKind::RelationJoined {
                role: RelationRole::Dashboard,
                id,
            } => state.relations.on_joined(id),
            EventKind::RelationChanged {
                role: RelationRole::Dashboard,
                id,
            } => state.relations.on_changed(id),
            EventKind::RelationDeparted {
                role: RelationRole::Dashboard,
                id,
            } => state.relations.on_departed(id),
            EventKind::RelationBroken {
                role: RelationRole::Dashboard,
                id,
            } => state.relations.on_broken(id),
            other => debug!("No state change for {:?}", other),
        }
    }

    async fn patch_k8s_service(&self) {
        if !self.leader {
            return;
        }
        let Some(patcher) = &self.deps.service_patcher else {
            return;
        };

        let ports = [(
            self.settings.app_name.clone(),
            self.settings.port,
            self.settings.port,
        )];
        match patcher.set_ports(&self.settings.app_name, &ports).await {
            Ok(()) => debug!("Successfully patched the Kubernetes service"),
            Err(e) => error!("Unable to patch the Kubernetes service: {}", e),
        }
    }

    async fn common_exit(&self, state: &mut OperatorState) -> Result<Status> {
        let container = self.deps.container.as_ref();
        if !container.can_connect().await {
            info!("Workload container not reachable yet");
            return Ok(Status::WaitingForStartup);
        }

        self.publish_ingress().await?;

        let dashboard = self
            .deps
            .relations
            .relations(self.settings.role_name(RelationRole::Dashboard))
            .await?;
        state.relations.prune_retired(dashboard.iter().map(|r| r.id));
        let aggregate = EndpointAggregator::new(self.settings.protocol.schema(), &state.relations)
            .aggregate(&dashboard);
        if !aggregate.is_valid() {
            info!("No usable Alertmanager endpoint yet");
            return Ok(Status::BlockedNoRelation);
        }

        let tls = self.deps.tls.material();
        let tls_changed = match refresh_tls(container, &tls, &self.settings.tls).await {
            Ok(changed) => changed,
            Err(e) => return blocked_on(e),
        };

        let rendered = render(&aggregate, &self.settings, &tls)?;

        let layer_changed = match self.plan.reconcile(&desired_layer(&self.settings)).await {
            Ok(changed) => changed,
            Err(e) => return blocked_on(e),
        };

        let running = match container.get_service(&self.settings.service_name).await {
            Ok(service) => service.is_some_and(|s| s.is_running()),
            Err(e) => return blocked_on(e),
        };

        let outcome = match self
            .service
            .ensure_running(state, &rendered, layer_changed || tls_changed, running)
            .await
        {
            Ok(outcome) => outcome,
            Err(e @ (Error::ServiceMissing(_) | Error::Unhealthy { .. })) => {
                error!("Service restart failed: {}", e);
                return Ok(Status::BlockedRestartFailed);
            }
            Err(e) => return blocked_on(e),
        };

        if outcome == RestartOutcome::Restarted {
            match self.service.workload_version().await {
                Some(version) => {
                    info!("Workload version {}", version);
                    state.workload_version = Some(version);
                }
                None => warn!("Workload version unknown"),
            }
        }

        self.publish_provider_info(state, &dashboard).await?;
        Ok(Status::Active)
    }

    async fn publish_ingress(&self) -> Result<()> {
        if !self.leader {
            return Ok(());
        }
        let relations = self
            .deps
            .relations
            .relations(self.settings.role_name(RelationRole::Ingress))
            .await?;
        let request = IngressRequest::new(
            &self.settings.service_hostname(),
            &self.settings.app_name,
            self.settings.port,
            &self.settings.model_name,
        );
        publish_ingress_request(self.deps.relations.as_ref(), &relations, &request, self.leader)
            .await?;
        Ok(())
    }

    async fn publish_provider_info(
        &self,
        state: &OperatorState,
        dashboard: &[RelationData],
    ) -> Result<()> {
        let info = ProviderInfo {
            service: self.settings.app_name.clone(),
            version: state.workload_version.clone(),
        };
        publish_provider_info(
            self.deps.relations.as_ref(),
            dashboard,
            &state.relations,
            &info,
            self.leader,
        )
        .await?;
        Ok(())
    }
}

/// Delay before the dispatcher should retry a failed invocation
pub fn error_policy(error: &Error) -> Duration {
    if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    }
}

/// Turn a supervisor failure into a blocked status; anything else propagates
fn blocked_on(err: Error) -> Result<Status> {
    match err {
        Error::Pebble(_) | Error::Connectivity(_) => {
            error!("{}", err);
            Ok(Status::BlockedPebbleError(err.to_string()))
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(Status::WaitingForStartup.to_string(), "waiting for startup");
        assert_eq!(
            Status::BlockedNoRelation.to_string(),
            "blocked: waiting for relation"
        );
        assert_eq!(
            Status::BlockedRestartFailed.to_string(),
            "blocked: service restart failed"
        );
        assert_eq!(Status::Active.to_string(), "active");
    }

    #[test]
    fn test_blocked_classification() {
        assert!(Status::BlockedPebbleError("x".to_string()).is_blocked());
        assert!(!Status::WaitingForStartup.is_blocked());
        assert!(Status::Active.is_active());
    }

    #[test]
    fn test_supervisor_errors_become_status() {
        let status = blocked_on(Error::Pebble("layer rejected".to_string())).unwrap();
        assert_eq!(
            status,
            Status::BlockedPebbleError("Pebble error: layer rejected".to_string())
        );
        assert!(blocked_on(Error::State("disk full".to_string())).is_err());
    }

    #[test]
    fn test_error_policy_retries_transient_errors_sooner() {
        let transient = Error::IoError(std::io::Error::other("connection reset"));
        let permanent = Error::ConfigError("bad port".to_string());
        assert_eq!(error_policy(&transient), Duration::from_secs(15));
        assert_eq!(error_policy(&permanent), Duration::from_secs(60));
    }
}
