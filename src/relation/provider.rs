//! Provider-side handshake on the dashboard relation
//!
//! Once the dashboard is serving, the leader tells every active related
//! Alertmanager which service it is talking to and at what version.

use tracing::{debug, info};

use super::{needs_update, ActiveRelations, RelationData, RelationSource};
use crate::endpoint::Bag;
use crate::error::Result;

pub const PROVIDER_SERVICE_KEY: &str = "provider-service";
pub const PROVIDER_VERSION_KEY: &str = "provider-version";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderInfo {
    pub service: String,
    pub version: Option<String>,
}

impl ProviderInfo {
    pub fn to_relation_data(&self) -> Bag {
        let mut data = Bag::new();
        data.insert(PROVIDER_SERVICE_KEY.to_string(), self.service.clone());
        if let Some(version) = &self.version {
            data.insert(PROVIDER_VERSION_KEY.to_string(), version.clone());
        }
        data
    }
}

/// Publish provider info to active dashboard relations (leader only)
pub async fn publish_provider_info(
    source: &dyn RelationSource,
    relations: &[RelationData],
    active: &ActiveRelations,
    info: &ProviderInfo,
    leader: bool,
) -> Result<usize> {
    if !leader {
        return Ok(0);
    }

    let data = info.to_relation_data();
    let mut written = 0;
    for relation in relations.iter().filter(|r| active.is_active(r.id)) {
        if !needs_update(&relation.local_app_data, &data) {
            debug!("Provider info on relation {} is current", relation.id);
            continue;
        }
        source.set_local_app_data(relation.id, &data).await?;
        info!(
            "Published provider info ({}) on relation {}",
            info.version.as_deref().unwrap_or("version unknown"),
            relation.id
        );
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_version_is_omitted() {
        let info = ProviderInfo {
            service: "karma".to_string(),
            version: None,
        };
        let data = info.to_relation_data();
        assert_eq!(data[PROVIDER_SERVICE_KEY], "karma");
        assert!(!data.contains_key(PROVIDER_VERSION_KEY));
    }

    #[test]
    fn test_version_is_published() {
        let info = ProviderInfo {
            service: "karma".to_string(),
            version: Some("0.90".to_string()),
        };
        assert_eq!(info.to_relation_data()[PROVIDER_VERSION_KEY], "0.90");
    }
}
