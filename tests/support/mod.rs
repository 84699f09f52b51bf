#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use karma_operator::config::Settings;
use karma_operator::controller::{Collaborators, MemoryStateStore, ReconciliationHook};
use karma_operator::endpoint::Bag;
use karma_operator::workload::{StaticTls, TlsMaterial};

use mocks::{FakeContainer, FakeProbe, FakeRelations, FakeServicePatcher};

pub const DASHBOARD: &str = "dashboard";
pub const INGRESS: &str = "ingress";

pub fn bag(pairs: &[(&str, &str)]) -> Bag {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Default settings without probe backoff
pub fn test_settings() -> Settings {
    let mut settings = Settings {
        app_name: "karma".to_string(),
        model_name: "cos".to_string(),
        ..Default::default()
    };
    settings.probe.backoff_ms = 0;
    settings
}

/// A hook wired to fakes, with handles to inspect them
pub struct Harness {
    pub container: FakeContainer,
    pub relations: FakeRelations,
    pub probe: FakeProbe,
    pub store: Arc<MemoryStateStore>,
    pub patcher: FakeServicePatcher,
    pub hook: ReconciliationHook,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_settings(), FakeProbe::healthy(), TlsMaterial::Disabled)
    }

    pub fn build(settings: Settings, probe: FakeProbe, tls: TlsMaterial) -> Self {
        let container = FakeContainer::default();
        let relations = FakeRelations::default();
        let store = Arc::new(MemoryStateStore::default());
        let patcher = FakeServicePatcher::default();

        let deps = Collaborators {
            container: Arc::new(container.clone()),
            relations: Arc::new(relations.clone()),
            probe: Arc::new(probe.clone()),
            tls: Arc::new(StaticTls(tls)),
            store: store.clone(),
            service_patcher: Some(Arc::new(patcher.clone())),
        };
        let hook = leader_hook(settings, deps);

        Self {
            container,
            relations,
            probe,
            store,
            patcher,
            hook,
        }
    }

    /// A fresh leader hook over existing fakes, e.g. after the TLS provider changed
    pub fn rewire(
        settings: Settings,
        container: &FakeContainer,
        relations: &FakeRelations,
        store: &Arc<MemoryStateStore>,
        tls: TlsMaterial,
    ) -> ReconciliationHook {
        let deps = Collaborators {
            container: Arc::new(container.clone()),
            relations: Arc::new(relations.clone()),
            probe: Arc::new(FakeProbe::healthy()),
            tls: Arc::new(StaticTls(tls)),
            store: store.clone(),
            service_patcher: None,
        };
        leader_hook(settings, deps)
    }
}

fn leader_hook(settings: Settings, deps: Collaborators) -> ReconciliationHook {
    ReconciliationHook::new(settings, deps)
        .expect("valid settings")
        .with_leadership(true)
}
