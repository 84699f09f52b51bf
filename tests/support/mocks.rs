#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use karma_operator::controller::service_patch::{PortSpec, ServicePatcher};
use karma_operator::endpoint::Bag;
use karma_operator::relation::{RelationData, RelationId, RelationSource};
use karma_operator::workload::{
    Container, ExecOutput, HealthProbe, Layer, Plan, ServiceInfo, ServiceStatus,
};
use karma_operator::{Error, Result};

/// Number of calls per supervisor operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerCalls {
    pub push: usize,
    pub remove: usize,
    pub add_layer: usize,
    pub start: usize,
    pub stop: usize,
    pub restart: usize,
    pub exec: usize,
}

impl ContainerCalls {
    /// Calls that change something in the workload
    pub fn writes(&self) -> usize {
        self.push + self.remove + self.add_layer + self.start + self.stop + self.restart
    }
}

#[derive(Debug)]
struct ContainerState {
    connectable: bool,
    files: BTreeMap<String, Vec<u8>>,
    plan: Plan,
    status: BTreeMap<String, ServiceStatus>,
    calls: ContainerCalls,
    exec_log: Vec<Vec<String>>,
    exec_output: ExecOutput,
    reject_layers: bool,
    ignore_layers: bool,
    failing_push: Option<String>,
}

/// In-memory container supervisor
#[derive(Clone, Debug)]
pub struct FakeContainer {
    inner: Arc<Mutex<ContainerState>>,
}

impl Default for FakeContainer {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContainerState {
                connectable: true,
                files: BTreeMap::new(),
                plan: Plan::default(),
                status: BTreeMap::new(),
                calls: ContainerCalls::default(),
                exec_log: Vec::new(),
                exec_output: ExecOutput {
                    stdout: "v0.114\n".to_string(),
                    ..Default::default()
                },
                reject_layers: false,
                ignore_layers: false,
                failing_push: None,
            })),
        }
    }
}

impl FakeContainer {
    fn state(&self) -> std::sync::MutexGuard<'_, ContainerState> {
        self.inner.lock().expect("fake container state")
    }

    pub fn set_connectable(&self, connectable: bool) {
        self.state().connectable = connectable;
    }

    /// Fail every `add_layer` with a supervisor error
    pub fn reject_layers(&self, reject: bool) {
        self.state().reject_layers = reject;
    }

    /// Accept `add_layer` without changing the plan
    pub fn ignore_layers(&self, ignore: bool) {
        self.state().ignore_layers = ignore;
    }

    /// Fail every push to `path`, or none when `None`
    pub fn fail_push_to(&self, path: Option<&str>) {
        self.state().failing_push = path.map(str::to_string);
    }

    pub fn set_exec_output(&self, output: ExecOutput) {
        self.state().exec_output = output;
    }

    pub fn set_status(&self, service: &str, status: ServiceStatus) {
        self.state().status.insert(service.to_string(), status);
    }

    pub fn calls(&self) -> ContainerCalls {
        self.state().calls.clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state()
            .files
            .get(path)
            .map(|content| String::from_utf8_lossy(content).into_owned())
    }

    pub fn plan(&self) -> Plan {
        self.state().plan.clone()
    }

    pub fn exec_log(&self) -> Vec<Vec<String>> {
        self.state().exec_log.clone()
    }
}

#[async_trait]
impl Container for FakeContainer {
    async fn can_connect(&self) -> bool {
        self.state().connectable
    }

    async fn push(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.calls.push += 1;
        if state.failing_push.as_deref() == Some(path) {
            return Err(Error::Pebble(format!("cannot write {path}")));
        }
        state.files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn pull(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state().files.get(path).cloned())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.remove += 1;
        state.files.remove(path);
        Ok(())
    }

    async fn get_plan(&self) -> Result<Plan> {
        Ok(self.state().plan.clone())
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        let mut state = self.state();
        state.calls.add_layer += 1;
        if state.reject_layers {
            return Err(Error::Pebble(format!("layer {label} rejected")));
        }
        if state.ignore_layers {
            return Ok(());
        }
        if !combine {
            state.plan.services.clear();
        }
        for (name, spec) in &layer.services {
            state.plan.services.insert(name.clone(), spec.clone());
            state
                .status
                .entry(name.clone())
                .or_insert(ServiceStatus::Inactive);
        }
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Option<ServiceInfo>> {
        let state = self.state();
        Ok(state.plan.services.get(name).map(|spec| ServiceInfo {
            name: name.to_string(),
            startup: spec.startup,
            current: state
                .status
                .get(name)
                .copied()
                .unwrap_or(ServiceStatus::Inactive),
        }))
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.start += 1;
        state.status.insert(name.to_string(), ServiceStatus::Active);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.stop += 1;
        state.status.insert(name.to_string(), ServiceStatus::Inactive);
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.restart += 1;
        state.status.insert(name.to_string(), ServiceStatus::Active);
        Ok(())
    }

    async fn exec(&self, argv: &[String]) -> Result<ExecOutput> {
        let mut state = self.state();
        state.calls.exec += 1;
        state.exec_log.push(argv.to_vec());
        Ok(state.exec_output.clone())
    }
}

#[derive(Debug, Default)]
struct RelationsState {
    by_role: BTreeMap<String, Vec<RelationData>>,
    writes: usize,
    fail_writes: bool,
}

/// Relation data keyed by role name
#[derive(Clone, Debug, Default)]
pub struct FakeRelations {
    inner: Arc<Mutex<RelationsState>>,
}

impl FakeRelations {
    fn state(&self) -> std::sync::MutexGuard<'_, RelationsState> {
        self.inner.lock().expect("fake relation state")
    }

    /// Add a relation whose remote units publish the given bags
    pub fn add_unit_relation(&self, role: &str, id: RelationId, units: &[(&str, Bag)]) {
        let relation = RelationData {
            id,
            remote_app: units
                .first()
                .and_then(|(unit, _)| unit.split('/').next())
                .map(str::to_string),
            remote_units: units
                .iter()
                .map(|(unit, bag)| (unit.to_string(), bag.clone()))
                .collect(),
            ..Default::default()
        };
        self.add_relation(role, relation);
    }

    pub fn add_relation(&self, role: &str, relation: RelationData) {
        self.state()
            .by_role
            .entry(role.to_string())
            .or_default()
            .push(relation);
    }

    pub fn remove_relation(&self, role: &str, id: RelationId) {
        if let Some(relations) = self.state().by_role.get_mut(role) {
            relations.retain(|relation| relation.id != id);
        }
    }

    pub fn local_app_data(&self, id: RelationId) -> Bag {
        self.state()
            .by_role
            .values()
            .flatten()
            .find(|relation| relation.id == id)
            .map(|relation| relation.local_app_data.clone())
            .unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Fail every local data write
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }
}

#[async_trait]
impl RelationSource for FakeRelations {
    async fn relations(&self, role: &str) -> Result<Vec<RelationData>> {
        Ok(self.state().by_role.get(role).cloned().unwrap_or_default())
    }

    async fn set_local_app_data(&self, relation_id: RelationId, data: &Bag) -> Result<()> {
        let mut state = self.state();
        state.writes += 1;
        if state.fail_writes {
            return Err(Error::State(format!("cannot write relation {relation_id}")));
        }
        for relation in state.by_role.values_mut().flatten() {
            if relation.id == relation_id {
                relation.local_app_data.extend(data.clone());
                return Ok(());
            }
        }
        Err(Error::State(format!("relation {relation_id} does not exist")))
    }
}

#[derive(Debug)]
struct ProbeState {
    script: VecDeque<bool>,
    healthy_after_script: bool,
    version: Option<String>,
    health_calls: usize,
}

/// Health probe answering from a script, then a fixed answer
#[derive(Clone, Debug)]
pub struct FakeProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::healthy()
    }
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self::scripted(&[], true)
    }

    pub fn unhealthy() -> Self {
        Self::scripted(&[], false)
    }

    pub fn scripted(results: &[bool], then: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProbeState {
                script: results.iter().copied().collect(),
                healthy_after_script: then,
                version: Some("0.114".to_string()),
                health_calls: 0,
            })),
        }
    }

    pub fn with_version(self, version: Option<&str>) -> Self {
        self.state().version = version.map(str::to_string);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.inner.lock().expect("fake probe state")
    }

    pub fn health_calls(&self) -> usize {
        self.state().health_calls
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn check_health(&self) -> Result<()> {
        let mut state = self.state();
        state.health_calls += 1;
        let healthy = match state.script.pop_front() {
            Some(result) => result,
            None => state.healthy_after_script,
        };
        if healthy {
            Ok(())
        } else {
            Err(Error::BadWorkloadResponse("connection refused".to_string()))
        }
    }

    async fn version(&self) -> Result<String> {
        self.state()
            .version
            .clone()
            .ok_or_else(|| Error::BadWorkloadResponse("HTTP 404".to_string()))
    }
}

/// Records every port patch
#[derive(Clone, Debug, Default)]
pub struct FakeServicePatcher {
    pub patches: Arc<Mutex<Vec<(String, Vec<PortSpec>)>>>,
    pub fail: bool,
}

impl FakeServicePatcher {
    pub fn patches(&self) -> Vec<(String, Vec<PortSpec>)> {
        self.patches.lock().expect("patch log").clone()
    }
}

#[async_trait]
impl ServicePatcher for FakeServicePatcher {
    async fn set_ports(&self, service_name: &str, ports: &[PortSpec]) -> Result<()> {
        self.patches
            .lock()
            .expect("patch log")
            .push((service_name.to_string(), ports.to_vec()));
        if self.fail {
            return Err(Error::ConfigError("forbidden".to_string()));
        }
        Ok(())
    }
}
