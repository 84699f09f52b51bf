//! Expose the web port on the application's Kubernetes Service

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec as K8sServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::Client;
use tracing::debug;

use super::state::FIELD_MANAGER;
use crate::error::{Error, Result};

/// `(name, port, target_port)`
pub type PortSpec = (String, u16, u16);

#[async_trait]
pub trait ServicePatcher: Send + Sync {
    async fn set_ports(&self, service_name: &str, ports: &[PortSpec]) -> Result<()>;
}

pub struct KubeServicePatcher {
    api: Api<Service>,
}

impl KubeServicePatcher {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

pub fn build_service_patch(service_name: &str, ports: &[PortSpec]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name.to_string()),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port, target)| ServicePort {
                        name: Some(name.clone()),
                        port: i32::from(*port),
                        target_port: Some(IntOrString::Int(i32::from(*target))),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ServicePatcher for KubeServicePatcher {
    async fn set_ports(&self, service_name: &str, ports: &[PortSpec]) -> Result<()> {
        let patch = build_service_patch(service_name, ports);
        self.api
            .patch(
                service_name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&patch),
            )
            .await
            .map_err(Error::KubeError)?;
        debug!("Patched ports of Service {}", service_name);
        Ok(())
    }
}
