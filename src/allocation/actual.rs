//! Observed placement updater
//!
//! Projects heartbeat routing tables into per-shard actual-allocation
//! records. Purely informational for operators and health reporting; the
//! planner and orchestrator never read these.

use crate::models::ShardAllocation;
use crate::store::MetadataStore;
use crate::Result;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ActualAllocationUpdater {
    store: Arc<dyn MetadataStore>,
}

impl ActualAllocationUpdater {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// One update pass: fold every heartbeat's routing into per-shard
    /// records, writing only the ones whose placement changed.
    pub async fn update_actual_allocations(&self, cluster: &str) -> Result<()> {
        let states = self.store.get_all_actual_states(cluster).await?;

        // (index, shard id) -> (writers, readers)
        let mut observed: BTreeMap<(String, String), (BTreeSet<String>, BTreeSet<String>)> =
            BTreeMap::new();
        for (unit_name, state) in &states {
            for (index_name, routings) in &state.node_routing {
                for routing in routings {
                    let key = (index_name.clone(), routing.shard_id.to_string());
                    let entry = observed.entry(key).or_default();
                    if routing.is_primary() {
                        entry.0.insert(unit_name.clone());
                    } else {
                        entry.1.insert(unit_name.clone());
                    }
                }
            }
        }

        let mut written = 0usize;
        for ((index_name, shard_id), (writers, readers)) in observed {
            let mut next = ShardAllocation::new(&index_name, &shard_id);
            next.ingest_sus = writers.into_iter().collect();
            next.search_sus = readers.into_iter().collect();
            next.status = ShardAllocation::STATUS_OBSERVED.to_string();
            next.allocation_timestamp = Utc::now();

            let current = match self
                .store
                .get_actual_allocation(cluster, &index_name, &shard_id)
                .await
            {
                Ok(current) => current,
                Err(e) => {
                    warn!(
                        index = %index_name,
                        shard = %shard_id,
                        error = %e,
                        "Could not load actual allocation, skipping"
                    );
                    continue;
                }
            };
            if let Some(current) = &current {
                if current.same_placement(&next) {
                    continue;
                }
            }

            match self
                .store
                .set_actual_allocation(cluster, &index_name, &shard_id, &next)
                .await
            {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    index = %index_name,
                    shard = %shard_id,
                    error = %e,
                    "Failed to write actual allocation"
                ),
            }
        }

        debug!(cluster, written, "Actual allocation pass complete");
        Ok(())
    }
}
