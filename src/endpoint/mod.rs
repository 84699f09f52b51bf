//! Alertmanager endpoints advertised over the dashboard relation
//!
//! Every related Alertmanager publishes a small string-to-string bag. The
//! bag is checked against the field schema of the relation's protocol
//! generation and normalised into an [`Endpoint`]. Validation never panics
//! and never aborts aggregation: callers receive an [`InvalidEndpoint`]
//! listing the missing and unknown fields and decide what to do with it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raw relation data bag
pub type Bag = BTreeMap<String, String>;

pub const FIELD_NAME: &str = "name";
pub const FIELD_URI: &str = "uri";

/// Fields every protocol generation requires
pub const REQUIRED_FIELDS: &[&str] = &[FIELD_NAME, FIELD_URI];

/// Keys the model writes into every unit bag on its own
pub const MODEL_MANAGED_KEYS: &[&str] = &["egress-subnets", "ingress-address", "private-address"];

/// Where the remote side of a relation publishes its endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BagSource {
    /// Per-unit bags; the first non-empty one (by unit name) is used
    Unit,
    /// The single application-level bag
    Application,
}

/// Field schema of one generation of the dashboard relation protocol
pub trait EndpointSchema: fmt::Debug + Send + Sync {
    fn version(&self) -> ProtocolVersion;

    fn required_fields(&self) -> &'static [&'static str] {
        REQUIRED_FIELDS
    }

    fn optional_fields(&self) -> &'static [&'static str];

    fn bag_source(&self) -> BagSource;

    fn is_recognized(&self, key: &str) -> bool {
        self.required_fields().contains(&key) || self.optional_fields().contains(&key)
    }
}

/// First generation: unit bags carrying `name`, `uri` and an optional `cluster`
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardV0;

impl EndpointSchema for DashboardV0 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V0
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &["cluster"]
    }

    fn bag_source(&self) -> BagSource {
        BagSource::Unit
    }
}

/// Second generation: application bag with proxy/readonly/headers/tls metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardV1;

impl EndpointSchema for DashboardV1 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &["cluster", "headers", "proxy", "readonly", "tls"]
    }

    fn bag_source(&self) -> BagSource {
        BagSource::Application
    }
}

/// Protocol generation spoken on the dashboard relation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    #[default]
    V0,
    V1,
}

impl ProtocolVersion {
    pub fn schema(self) -> &'static dyn EndpointSchema {
        match self {
            ProtocolVersion::V0 => &DashboardV0,
            ProtocolVersion::V1 => &DashboardV1,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V0 => write!(f, "v0"),
            ProtocolVersion::V1 => write!(f, "v1"),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v0" | "0" => Ok(ProtocolVersion::V0),
            "v1" | "1" => Ok(ProtocolVersion::V1),
            other => Err(format!("unknown dashboard protocol version: {other}")),
        }
    }
}

/// A validated upstream alert source
///
/// Holds only recognised fields with non-empty values, keyed in sorted
/// order so that serialisation is stable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(Bag);

impl Endpoint {
    pub fn name(&self) -> &str {
        self.get(FIELD_NAME).unwrap_or_default()
    }

    pub fn uri(&self) -> &str {
        self.get(FIELD_URI).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &Bag {
        &self.0
    }

    /// Both required fields carry a value
    pub fn is_complete(&self) -> bool {
        !self.name().is_empty() && !self.uri().is_empty()
    }
}

/// Why a bag was rejected
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidEndpoint {
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

impl std::error::Error for InvalidEndpoint {}

impl fmt::Display for InvalidEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!(
                "missing required field(s): {}",
                self.missing.join(", ")
            ));
        }
        if !self.unknown.is_empty() {
            parts.push(format!("unknown field(s): {}", self.unknown.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Validate a raw bag against `schema`
///
/// Fails when a key outside the required and optional sets is present, or
/// when a required key is absent or empty. Empty optional values are
/// dropped rather than rejected.
pub fn validate(schema: &dyn EndpointSchema, raw: &Bag) -> Result<Endpoint, InvalidEndpoint> {
    let unknown: Vec<String> = raw
        .keys()
        .filter(|key| !schema.is_recognized(key))
        .cloned()
        .collect();

    let missing: Vec<String> = schema
        .required_fields()
        .iter()
        .filter(|field| raw.get(**field).map_or(true, |v| v.is_empty()))
        .map(|field| field.to_string())
        .collect();

    if !unknown.is_empty() || !missing.is_empty() {
        return Err(InvalidEndpoint { missing, unknown });
    }

    let fields = raw
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Endpoint(fields))
}

/// Build an endpoint from its parts, skipping optional fields without a value
pub fn build<'a, I>(
    schema: &dyn EndpointSchema,
    name: &str,
    uri: &str,
    optional: I,
) -> Result<Endpoint, InvalidEndpoint>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut raw = Bag::new();
    raw.insert(FIELD_NAME.to_string(), name.to_string());
    raw.insert(FIELD_URI.to_string(), uri.to_string());

    for (key, value) in optional {
        match value {
            Some(v) if !v.is_empty() => {
                raw.insert(key.to_string(), v.to_string());
            }
            _ => {}
        }
    }

    validate(schema, &raw)
}

/// Drop the keys the model maintains in every unit bag
pub fn strip_model_keys(bag: &Bag) -> Bag {
    bag.iter()
        .filter(|(key, _)| !MODEL_MANAGED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
