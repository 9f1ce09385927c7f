//! Shard allocation planning loop

use super::engine::{
    AllocationDecisionEngine, GroupAwareBinPackingEngine, ShardContext, StandardAllocationEngine,
};
use super::AllocationStrategy;
use crate::models::{IndexConfig, SearchUnit, ShardAllocation};
use crate::store::MetadataStore;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plans the allocation of every shard in a cluster.
///
/// Iterates the index catalogue in lexical order, asks the strategy's
/// decision engine for each shard, and writes the planned allocation only
/// when the placement actually changed. A failure on one shard never stops
/// the others.
pub struct ShardAllocator {
    store: Arc<dyn MetadataStore>,
    standard: StandardAllocationEngine,
    bin_packing: GroupAwareBinPackingEngine,
}

impl ShardAllocator {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            standard: StandardAllocationEngine,
            bin_packing: GroupAwareBinPackingEngine,
        }
    }

    fn engine_for(&self, strategy: AllocationStrategy) -> &dyn AllocationDecisionEngine {
        match strategy {
            AllocationStrategy::RespectReplicaCount => &self.standard,
            AllocationStrategy::UseAllAvailableNodes => &self.bin_packing,
        }
    }

    /// One planning pass over the whole catalogue.
    pub async fn plan_shard_allocation(
        &self,
        cluster: &str,
        strategy: AllocationStrategy,
    ) -> Result<()> {
        let mut indices = self.store.get_all_index_configs(cluster).await?;
        if indices.is_empty() {
            debug!(cluster, "No indices configured, nothing to plan");
            return Ok(());
        }
        indices.sort_by(|a, b| a.index_name.cmp(&b.index_name));

        let units = self.store.get_all_search_units(cluster).await?;

        let mut written = 0usize;
        for index in &indices {
            for shard in 0..index.shard_count() {
                match self
                    .plan_one_shard(cluster, index, shard, &units, strategy)
                    .await
                {
                    Ok(true) => written += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        index = %index.index_name,
                        shard,
                        error = %e,
                        "Failed to plan shard, continuing with the rest"
                    ),
                }
            }
        }

        if written > 0 {
            info!(cluster, ?strategy, written, "Planned shard allocations updated");
        } else {
            debug!(cluster, ?strategy, "All planned allocations already current");
        }
        Ok(())
    }

    /// Plan one shard. Returns whether a write was performed.
    async fn plan_one_shard(
        &self,
        cluster: &str,
        index: &IndexConfig,
        shard: usize,
        units: &[SearchUnit],
        strategy: AllocationStrategy,
    ) -> Result<bool> {
        let shard_id = shard.to_string();

        // A failed read degrades to planning from scratch; it never deletes
        let current = match self
            .store
            .get_planned_allocation(cluster, &index.index_name, &shard_id)
            .await
        {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    index = %index.index_name,
                    shard = %shard_id,
                    error = %e,
                    "Could not load planned allocation, planning fresh"
                );
                None
            }
        };

        let ctx = ShardContext { index, shard };
        let selection = self.engine_for(strategy).select(&ctx, units, current.as_ref());

        let mut next = ShardAllocation::new(&index.index_name, &shard_id);
        next.search_sus = selection.readers;
        next.status = match selection.writer {
            Some(writer) => {
                next.ingest_sus.push(writer);
                ShardAllocation::STATUS_PLANNED.to_string()
            }
            None => ShardAllocation::STATUS_NO_WRITER.to_string(),
        };
        next.allocation_timestamp = Utc::now();

        if let Some(current) = &current {
            if current.same_placement(&next) {
                return Ok(false);
            }
        }

        self.store
            .set_planned_allocation(cluster, &index.index_name, &shard_id, &next)
            .await?;
        Ok(true)
    }
}
