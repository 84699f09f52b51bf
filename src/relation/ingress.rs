//! Ingress request published to the reverse proxy on the `ingress` relation

use tracing::{debug, error, info};

use super::{needs_update, RelationData, RelationSource};
use crate::endpoint::Bag;
use crate::error::{Error, Result};

pub const REQUIRED_INGRESS_FIELDS: &[&str] = &["service-hostname", "service-name", "service-port"];

pub const OPTIONAL_INGRESS_FIELDS: &[&str] = &[
    "additional-hostnames",
    "limit-rps",
    "limit-whitelist",
    "max-body-size",
    "owasp-modsecurity-crs",
    "owasp-modsecurity-custom-rules",
    "path-routes",
    "retry-errors",
    "rewrite-enabled",
    "rewrite-target",
    "service-namespace",
    "session-cookie-max-age",
    "tls-secret-name",
];

/// Legacy key -> key expected by newer ingress providers
const INTERFACE_ALIASES: &[(&str, &str)] = &[
    ("service-hostname", "host"),
    ("service-name", "name"),
    ("service-namespace", "model"),
    ("service-port", "port"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRequest {
    fields: Bag,
}

impl IngressRequest {
    pub fn new(hostname: &str, service_name: &str, port: u16, namespace: &str) -> Self {
        let mut fields = Bag::new();
        fields.insert("service-hostname".to_string(), hostname.to_string());
        fields.insert("service-name".to_string(), service_name.to_string());
        fields.insert("service-port".to_string(), port.to_string());
        fields.insert("service-namespace".to_string(), namespace.to_string());
        Self { fields }
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    /// Validated bag including the interface aliases
    pub fn to_relation_data(&self) -> Result<Bag> {
        let unknown: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|key| {
                !REQUIRED_INGRESS_FIELDS.contains(key) && !OPTIONAL_INGRESS_FIELDS.contains(key)
            })
            .collect();
        if !unknown.is_empty() {
            return Err(Error::ConfigError(format!(
                "unknown ingress key(s): {}",
                unknown.join(", ")
            )));
        }

        let missing: Vec<&str> = REQUIRED_INGRESS_FIELDS
            .iter()
            .copied()
            .filter(|key| self.fields.get(*key).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(Error::ConfigError(format!(
                "missing required ingress key(s): {}",
                missing.join(", ")
            )));
        }

        let mut data = self.fields.clone();
        for (legacy, alias) in INTERFACE_ALIASES {
            if let Some(value) = self.fields.get(*legacy).filter(|v| !v.is_empty()) {
                data.insert(alias.to_string(), value.clone());
            }
        }
        Ok(data)
    }
}

/// Write the ingress request into every ingress relation that lacks it
///
/// Only the leader may write application data; other units return
/// without touching the relations. Returns the number of relations written.
pub async fn publish_ingress_request(
    source: &dyn RelationSource,
    relations: &[RelationData],
    request: &IngressRequest,
    leader: bool,
) -> Result<usize> {
    if !leader || relations.is_empty() {
        return Ok(0);
    }

    let data = match request.to_relation_data() {
        Ok(data) => data,
        Err(e) => {
            error!("Ingress relation error, request not published: {}", e);
            return Ok(0);
        }
    };

    let mut written = 0;
    for relation in relations {
        if !needs_update(&relation.local_app_data, &data) {
            debug!("Ingress request on relation {} is current", relation.id);
            continue;
        }
        source.set_local_app_data(relation.id, &data).await?;
        info!("Published ingress request on relation {}", relation.id);
        written += 1;
    }
    Ok(written)
}
