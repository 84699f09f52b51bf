//! Liveness of dashboard relation instances
//!
//! `relation-departed` fires once per leaving remote unit while other units
//! of the same application may still be related, so it never changes
//! membership. `relation-broken` is the only authoritative "gone" signal.
//! Broken ids are retired for good: relation ids are never reused, and a
//! replayed `relation-joined` delivered after `relation-broken` must not
//! resurrect stale data. A retired id is only kept while its relation is
//! still listed, since nothing can replay it afterwards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RelationId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRelations {
    #[serde(default)]
    active: BTreeSet<RelationId>,
    #[serde(default)]
    retired: BTreeSet<RelationId>,
}

impl ActiveRelations {
    pub fn on_joined(&mut self, relation_id: RelationId) {
        if self.retired.contains(&relation_id) {
            debug!(
                "Ignoring join for relation {} which is already broken",
                relation_id
            );
            return;
        }
        if self.active.insert(relation_id) {
            info!("Relation {} is now active", relation_id);
        }
    }

    /// A changed event proves the relation exists even if its join was missed
    pub fn on_changed(&mut self, relation_id: RelationId) {
        self.on_joined(relation_id);
    }

    pub fn on_departed(&mut self, relation_id: RelationId) {
        debug!(
            "Unit departed relation {}; membership unchanged ({} active)",
            relation_id,
            self.active.len()
        );
    }

    pub fn on_broken(&mut self, relation_id: RelationId) {
        self.retired.insert(relation_id);
        if self.active.remove(&relation_id) {
            info!("Relation {} is broken and no longer active", relation_id);
        }
    }

    /// Forget retired ids whose relation is no longer listed
    pub fn prune_retired(&mut self, listed: impl IntoIterator<Item = RelationId>) {
        let listed: BTreeSet<RelationId> = listed.into_iter().collect();
        let before = self.retired.len();
        self.retired.retain(|id| listed.contains(id));
        if self.retired.len() != before {
            debug!("Pruned {} retired relation id(s)", before - self.retired.len());
        }
    }

    pub fn is_retired(&self, relation_id: RelationId) -> bool {
        self.retired.contains(&relation_id)
    }

    pub fn is_active(&self, relation_id: RelationId) -> bool {
        self.active.contains(&relation_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.active.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
