//! Server certificate, key and CA bundle handled as one unit
//!
//! Material is either fully present or treated as absent: a provider that
//! hands out only some of the three blobs yields [`TlsMaterial::Disabled`].

use tracing::{debug, info, warn};

use super::container::Container;
use crate::config::TlsPaths;
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsMaterial {
    #[default]
    Disabled,
    Enabled {
        cert: String,
        key: String,
        ca: String,
    },
}

impl TlsMaterial {
    pub fn from_parts(cert: Option<String>, key: Option<String>, ca: Option<String>) -> Self {
        match (cert, key, ca) {
            (Some(cert), Some(key), Some(ca))
                if !cert.is_empty() && !key.is_empty() && !ca.is_empty() =>
            {
                TlsMaterial::Enabled { cert, key, ca }
            }
            (None, None, None) => TlsMaterial::Disabled,
            (cert, key, ca) => {
                warn!(
                    "Ignoring partial TLS material (cert: {}, key: {}, ca: {}); serving without TLS",
                    cert.is_some(),
                    key.is_some(),
                    ca.is_some()
                );
                TlsMaterial::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsMaterial::Enabled { .. })
    }
}

/// Provider of the current TLS material (certificate requirer)
pub trait TlsSource: Send + Sync {
    fn material(&self) -> TlsMaterial;
}

/// Fixed material, mostly useful for tooling and tests
#[derive(Clone, Debug, Default)]
pub struct StaticTls(pub TlsMaterial);

impl TlsSource for StaticTls {
    fn material(&self) -> TlsMaterial {
        self.0.clone()
    }
}

pub const UPDATE_CA_CERTIFICATES: &[&str] = &["update-ca-certificates", "--fresh"];

/// Bring the files in the workload in line with `material`
///
/// Returns whether anything was written or removed. Files whose content
/// already matches are left alone, so repeated calls are free of writes.
///
/// The three files are written one at a time. A failed push can leave a
/// mixed set behind; each file is compared on its own, so the next call
/// finishes the update and rebuilds the trust store if the CA is new.
pub async fn refresh_tls(
    container: &dyn Container,
    material: &TlsMaterial,
    paths: &TlsPaths,
) -> Result<bool> {
    let ca_changed = match material {
        TlsMaterial::Enabled { cert, key, ca } => {
            let cert_changed = push_if_changed(container, &paths.cert, cert).await?;
            let key_changed = push_if_changed(container, &paths.key, key).await?;
            let ca_changed = push_if_changed(container, &paths.ca, ca).await?;
            if cert_changed || key_changed {
                info!("Server certificate updated in workload");
            }
            if !(cert_changed || key_changed || ca_changed) {
                debug!("TLS material in workload is current");
                return Ok(false);
            }
            ca_changed
        }
        TlsMaterial::Disabled => {
            let cert_removed = remove_if_present(container, &paths.cert).await?;
            let key_removed = remove_if_present(container, &paths.key).await?;
            let ca_removed = remove_if_present(container, &paths.ca).await?;
            if !(cert_removed || key_removed || ca_removed) {
                return Ok(false);
            }
            info!("TLS material removed from workload");
            ca_removed
        }
    };

    if ca_changed {
        update_ca_trust(container).await?;
    }
    Ok(true)
}

async fn push_if_changed(container: &dyn Container, path: &str, content: &str) -> Result<bool> {
    let current = container.pull(path).await?;
    if current.as_deref() == Some(content.as_bytes()) {
        return Ok(false);
    }
    container.push(path, content.as_bytes()).await?;
    debug!("Pushed {}", path);
    Ok(true)
}

async fn remove_if_present(container: &dyn Container, path: &str) -> Result<bool> {
    if container.pull(path).await?.is_none() {
        return Ok(false);
    }
    container.remove(path).await?;
    debug!("Removed {}", path);
    Ok(true)
}

async fn update_ca_trust(container: &dyn Container) -> Result<()> {
    let argv: Vec<String> = UPDATE_CA_CERTIFICATES
        .iter()
        .map(|arg| arg.to_string())
        .collect();
    let output = container.exec(&argv).await?;
    if output.exit_code != 0 {
        return Err(Error::Pebble(format!(
            "update-ca-certificates exited with {}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    info!("Refreshed CA trust store in workload");
    Ok(())
}
