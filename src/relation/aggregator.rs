//! Merge the endpoints advertised on every active dashboard relation

use tracing::{debug, warn};

use super::{ActiveRelations, RelationData};
use crate::endpoint::{self, Bag, BagSource, Endpoint, EndpointSchema};

/// Ordered, de-duplicated endpoints across all active relations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    endpoints: Vec<Endpoint>,
}

impl Aggregate {
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// At least one endpoint with both `name` and `uri` populated
    ///
    /// The completeness check is repeated here even though validation
    /// already enforces it, so that a relaxed schema can never start the
    /// workload without an Alertmanager to talk to.
    pub fn is_valid(&self) -> bool {
        !self.endpoints.is_empty() && self.endpoints.iter().any(Endpoint::is_complete)
    }
}

impl FromIterator<Endpoint> for Aggregate {
    fn from_iter<T: IntoIterator<Item = Endpoint>>(iter: T) -> Self {
        let mut aggregate = Aggregate::default();
        for endpoint in iter {
            if !aggregate.endpoints.contains(&endpoint) {
                aggregate.endpoints.push(endpoint);
            }
        }
        aggregate
    }
}

pub struct EndpointAggregator<'a> {
    schema: &'a dyn EndpointSchema,
    active: &'a ActiveRelations,
}

impl<'a> EndpointAggregator<'a> {
    pub fn new(schema: &'a dyn EndpointSchema, active: &'a ActiveRelations) -> Self {
        Self { schema, active }
    }

    /// Collect endpoints from relations whose id is in the active set
    ///
    /// Relations are visited in id order so the result is stable for
    /// unchanged input. Invalid bags are logged and skipped.
    pub fn aggregate(&self, relations: &[RelationData]) -> Aggregate {
        let mut ordered: Vec<&RelationData> = relations.iter().collect();
        ordered.sort_by_key(|relation| relation.id);

        ordered
            .into_iter()
            .filter(|relation| {
                let active = self.active.is_active(relation.id);
                if !active {
                    debug!(
                        "Skipping relation {}: not in the active set (broken or not yet joined)",
                        relation.id
                    );
                }
                active
            })
            .filter_map(|relation| {
                let bag = self.remote_bag(relation)?;
                match endpoint::validate(self.schema, &bag) {
                    Ok(endpoint) => Some(endpoint),
                    Err(e) => {
                        warn!(
                            "Ignoring invalid {} data on relation {}: {}",
                            self.schema.version(),
                            relation.id,
                            e
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// The bag published by the remote side, with model-managed keys removed
    fn remote_bag(&self, relation: &RelationData) -> Option<Bag> {
        let bag = match self.schema.bag_source() {
            BagSource::Unit => relation
                .remote_units
                .values()
                .map(endpoint::strip_model_keys)
                .find(|bag| !bag.is_empty()),
            BagSource::Application => Some(endpoint::strip_model_keys(&relation.remote_app_data))
                .filter(|bag| !bag.is_empty()),
        };

        if bag.is_none() {
            debug!("Relation {} has no remote data yet", relation.id);
        }
        bag
    }
}
