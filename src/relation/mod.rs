//! Relation data access and the relation-driven parts of reconciliation
//!
//! The operator consumes one role (`dashboard`, where Alertmanagers advertise
//! themselves) and requires one more (`ingress`). Relation data is read
//! fresh on every pass through a [`RelationSource`]; only the set of live
//! relation ids is carried between passes.

pub mod aggregator;
pub mod ingress;
pub mod provider;
pub mod tracker;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::endpoint::Bag;
use crate::error::Result;

pub use aggregator::{Aggregate, EndpointAggregator};
pub use ingress::{publish_ingress_request, IngressRequest};
pub use provider::{publish_provider_info, ProviderInfo};
pub use tracker::ActiveRelations;

pub type RelationId = u32;

/// Relation roles this operator takes part in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationRole {
    /// Alertmanagers advertising themselves to the dashboard
    Dashboard,
    /// Reverse proxy exposing the dashboard
    Ingress,
}

impl fmt::Display for RelationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationRole::Dashboard => write!(f, "dashboard"),
            RelationRole::Ingress => write!(f, "ingress"),
        }
    }
}

/// Snapshot of one relation instance as seen from this unit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationData {
    pub id: RelationId,
    #[serde(default)]
    pub remote_app: Option<String>,
    /// This application's bag (writable by the leader only)
    #[serde(default)]
    pub local_app_data: Bag,
    #[serde(default)]
    pub remote_app_data: Bag,
    /// Remote unit name -> unit bag
    #[serde(default)]
    pub remote_units: BTreeMap<String, Bag>,
}

/// Read and write access to relation data
#[async_trait]
pub trait RelationSource: Send + Sync {
    /// All relation instances currently established for a role name
    async fn relations(&self, role: &str) -> Result<Vec<RelationData>>;

    /// Merge `data` into this application's bag on one relation
    async fn set_local_app_data(&self, relation_id: RelationId, data: &Bag) -> Result<()>;
}

/// True when writing `desired` would change `current`
pub(crate) fn needs_update(current: &Bag, desired: &Bag) -> bool {
    desired
        .iter()
        .any(|(key, value)| current.get(key) != Some(value))
}
