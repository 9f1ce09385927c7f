//! Index lifecycle operations
//!
//! Creation seeds the catalogue record the allocator plans from; deletion
//! unwinds everything the pipeline derived from it: planned allocations,
//! the index subtree, and the index's entries in every node's goal state.

use crate::models::{IndexConfig, IndexSettings};
use crate::store::MetadataStore;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters for creating an index. Mappings and settings blobs are opaque
/// to the control plane and stored as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub index_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<String>,
    /// Replica cap per shard; length defines the shard count. Defaults to
    /// one single-replica shard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_replica_count: Option<Vec<u32>>,
    /// Desired replica-group count per shard for the bin-packing strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_groups_allocate_count: Option<Vec<u32>>,
}

pub struct IndexManager {
    store: Arc<dyn MetadataStore>,
}

impl IndexManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Create an index. Creating an index that already exists is a no-op.
    pub async fn create_index(&self, cluster: &str, request: CreateIndexRequest) -> Result<()> {
        if cluster.trim().is_empty() {
            return Err(Error::InvalidRequest("cluster id must not be empty".into()));
        }
        if request.index_name.trim().is_empty() {
            return Err(Error::InvalidRequest("index name must not be empty".into()));
        }

        if self
            .store
            .get_index_config(cluster, &request.index_name)
            .await?
            .is_some()
        {
            info!(index = %request.index_name, "Index already exists, skipping creation");
            return Ok(());
        }

        let units = self.store.get_all_search_units(cluster).await?;
        if units.is_empty() {
            return Err(Error::InvalidRequest(
                "no search units available for index allocation".into(),
            ));
        }

        let shard_replica_count = request.shard_replica_count.unwrap_or_else(|| vec![1]);
        let index = IndexConfig {
            index_name: request.index_name.clone(),
            settings: IndexSettings {
                number_of_shards: shard_replica_count.len() as u32,
                shard_replica_count,
                shard_groups_allocate_count: request.shard_groups_allocate_count,
            },
        };
        self.store.create_index_config(cluster, &index).await?;
        info!(
            index = %index.index_name,
            shards = index.shard_count(),
            "Created index configuration"
        );

        if let Some(mappings) = request.mappings.as_deref().filter(|m| !m.trim().is_empty()) {
            self.store
                .set_index_mappings(cluster, &index.index_name, mappings)
                .await?;
        }
        if let Some(settings) = request.settings.as_deref().filter(|s| !s.trim().is_empty()) {
            self.store
                .set_index_settings(cluster, &index.index_name, settings)
                .await?;
        }

        Ok(())
    }

    /// Delete an index and everything derived from it. Deleting a missing
    /// index is a no-op, so removal is observable exactly once.
    pub async fn delete_index(&self, cluster: &str, index_name: &str) -> Result<()> {
        if cluster.trim().is_empty() {
            return Err(Error::InvalidRequest("cluster id must not be empty".into()));
        }
        if index_name.trim().is_empty() {
            return Err(Error::InvalidRequest("index name must not be empty".into()));
        }

        if self.store.get_index_config(cluster, index_name).await?.is_none() {
            warn!(index = %index_name, "Index not found, nothing to delete");
            return Ok(());
        }

        self.delete_planned_allocations(cluster, index_name).await?;
        self.store.delete_index_config(cluster, index_name).await?;
        info!(index = %index_name, "Deleted index configuration");

        self.scrub_goal_states(cluster, index_name).await?;
        info!(index = %index_name, "Index deletion complete");
        Ok(())
    }

    async fn delete_planned_allocations(&self, cluster: &str, index_name: &str) -> Result<()> {
        let allocations = self
            .store
            .get_all_planned_allocations(cluster, index_name)
            .await?;
        let count = allocations.len();
        for allocation in allocations {
            if let Err(e) = self
                .store
                .delete_planned_allocation(cluster, index_name, &allocation.shard_id)
                .await
            {
                warn!(
                    index = %index_name,
                    shard = %allocation.shard_id,
                    error = %e,
                    "Failed to delete planned allocation"
                );
            }
        }
        debug!(index = %index_name, count, "Removed planned allocations");
        Ok(())
    }

    /// Remove the deleted index from every node's goal state so workers drop
    /// their local shards on the next pull.
    async fn scrub_goal_states(&self, cluster: &str, index_name: &str) -> Result<()> {
        let units = self.store.get_all_search_units(cluster).await?;
        for unit in units {
            let goal_state = match self.store.get_goal_state(cluster, &unit.name).await {
                Ok(Some(goal_state)) => goal_state,
                Ok(None) => continue,
                Err(e) => {
                    warn!(unit = %unit.name, error = %e, "Could not load goal state for cleanup");
                    continue;
                }
            };
            if !goal_state.has_index(index_name) {
                continue;
            }

            let mut next = goal_state;
            next.local_shards.remove(index_name);
            next.version += 1;
            next.last_updated = Some(Utc::now());
            match self.store.update_goal_state(cluster, &unit.name, &next).await {
                Ok(()) => {
                    info!(unit = %unit.name, index = %index_name, "Removed deleted index from goal state")
                }
                Err(e) => {
                    warn!(unit = %unit.name, error = %e, "Failed to scrub goal state")
                }
            }
        }
        Ok(())
    }
}
