//! Render the Karma configuration document
//!
//! The document is serialised from plain structs, so key order follows
//! field declaration order and endpoint fields come out sorted. Identical
//! input therefore always produces identical bytes and the same hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::settings::{LogOptions, Settings};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::relation::Aggregate;
use crate::workload::TlsMaterial;

#[derive(Debug, Serialize)]
struct KarmaConfig<'a> {
    alertmanager: AlertmanagerSection<'a>,
    listen: ListenSection<'a>,
    log: &'a LogOptions,
}

#[derive(Debug, Serialize)]
struct AlertmanagerSection<'a> {
    servers: &'a [Endpoint],
}

#[derive(Debug, Serialize)]
struct ListenSection<'a> {
    port: u16,
    prefix: String,
    tls: ListenTls<'a>,
}

/// Both keys are always present; empty when TLS is disabled
#[derive(Debug, Serialize)]
struct ListenTls<'a> {
    cert: &'a str,
    key: &'a str,
}

/// A rendered document and its digest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedConfig {
    pub document: String,
    pub hash: String,
}

impl RenderedConfig {
    pub fn as_bytes(&self) -> &[u8] {
        self.document.as_bytes()
    }
}

pub fn render(
    aggregate: &Aggregate,
    settings: &Settings,
    tls: &TlsMaterial,
) -> Result<RenderedConfig> {
    let (cert, key) = if tls.is_enabled() {
        (settings.tls.cert.as_str(), settings.tls.key.as_str())
    } else {
        ("", "")
    };

    let config = KarmaConfig {
        alertmanager: AlertmanagerSection {
            servers: aggregate.endpoints(),
        },
        listen: ListenSection {
            port: settings.port,
            prefix: settings.url_prefix()?,
            tls: ListenTls { cert, key },
        },
        log: &settings.log,
    };

    let document = serde_yaml::to_string(&config)?;
    let hash = config_hash(document.as_bytes());
    Ok(RenderedConfig { document, hash })
}

/// Hex SHA-256 of a rendered document
pub fn config_hash(document: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document);
    hex::encode(hasher.finalize())
}
