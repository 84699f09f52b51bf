//! State carried between reconciliation passes
//!
//! The hook loads [`OperatorState`] at the start of a pass and saves it at
//! the end, only when something changed. Three backends are provided: in
//! memory, a JSON file, and a key in a Kubernetes ConfigMap.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::relation::ActiveRelations;

pub const FIELD_MANAGER: &str = "karma-operator";
pub const STATE_KEY: &str = "state.json";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorState {
    #[serde(default)]
    pub relations: ActiveRelations,
    /// Hash of the last document pushed to the workload
    #[serde(default)]
    pub config_hash: Option<String>,
    #[serde(default)]
    pub workload_version: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OperatorState {
    /// Equal apart from the save timestamp
    pub fn same_content(&self, other: &OperatorState) -> bool {
        self.relations == other.relations
            && self.config_hash == other.config_hash
            && self.workload_version == other.workload_version
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stored state, or the default when nothing was saved yet
    async fn load(&self) -> Result<OperatorState>;

    async fn save(&self, state: &OperatorState) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<OperatorState>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new(state: OperatorState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<OperatorState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &OperatorState) -> Result<()> {
        *self.state.lock().await = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// JSON document on local disk, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<OperatorState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::State(format!("corrupt state file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state at {}, starting fresh", self.path.display());
                Ok(OperatorState::default())
            }
            Err(e) => Err(Error::IoError(e)),
        }
    }

    async fn save(&self, state: &OperatorState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

/// One key of a ConfigMap, written with server-side apply
#[derive(Clone)]
pub struct ConfigMapStateStore {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapStateStore {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

/// ConfigMap carrying `state` under [`STATE_KEY`]
pub fn build_state_config_map(name: &str, state: &OperatorState) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/managed-by".to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            STATE_KEY.to_string(),
            serde_json::to_string(state)?,
        )])),
        ..Default::default()
    })
}

/// State from the result of reading the ConfigMap `name`
///
/// A missing ConfigMap or key means nothing was saved yet.
pub fn state_from_config_map(
    name: &str,
    lookup: std::result::Result<ConfigMap, kube::Error>,
) -> Result<OperatorState> {
    match lookup {
        Ok(cm) => match cm.data.as_ref().and_then(|data| data.get(STATE_KEY)) {
            Some(content) => serde_json::from_str(content)
                .map_err(|e| Error::State(format!("corrupt state in ConfigMap {name}: {e}"))),
            None => {
                debug!("ConfigMap {} has no {} key", name, STATE_KEY);
                Ok(OperatorState::default())
            }
        },
        Err(kube::Error::Api(e)) if e.code == 404 => {
            info!("State ConfigMap {} not found, starting fresh", name);
            Ok(OperatorState::default())
        }
        Err(e) => Err(Error::KubeError(e)),
    }
}

#[async_trait]
impl StateStore for ConfigMapStateStore {
    async fn load(&self) -> Result<OperatorState> {
        state_from_config_map(&self.name, self.api.get(&self.name).await)
    }

    async fn save(&self, state: &OperatorState) -> Result<()> {
        let cm = build_state_config_map(&self.name, state)?;
        self.api
            .patch(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&cm),
            )
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}
