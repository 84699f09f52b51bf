//! Reconciliation of the dashboard workload
//!
//! [`hook::ReconciliationHook`] drives a pass; the other modules each own
//! one step of it.

pub mod hook;
pub mod plan;
pub mod service;
pub mod service_patch;
pub mod state;

pub use hook::{error_policy, Collaborators, EventKind, ReconciliationHook, Status};
pub use plan::{desired_layer, PlanReconciler};
pub use service::{RestartOutcome, ServiceController};
pub use service_patch::{KubeServicePatcher, ServicePatcher};
pub use state::{
    build_state_config_map, state_from_config_map, ConfigMapStateStore, FileStateStore,
    MemoryStateStore, OperatorState, StateStore,
};
