//! Metadata store abstraction
//!
//! The transactional key-value store is the single source of truth for the
//! control plane; no component talks to another except through it. The trait
//! abstracts the backend: etcd in production, an in-memory map for
//! development and tests.

mod etcd;
mod memory;
mod paths;

pub use etcd::{EtcdMetadataStore, DEFAULT_OP_TIMEOUT_SECS};
pub use memory::InMemoryMetadataStore;
pub use paths::{PathResolver, DEFAULT_RUNTIME_ENV};

use crate::models::{
    IndexConfig, SearchUnit, SearchUnitActualState, SearchUnitGoalState, ShardAllocation,
    TaskMetadata,
};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Cluster metadata operations. All methods are cluster-scoped; one store
/// handle serves any number of clusters.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ---- controller tasks ----

    /// All task records, sorted by ascending priority
    async fn get_all_tasks(&self, cluster: &str) -> Result<Vec<TaskMetadata>>;

    async fn get_task(&self, cluster: &str, task_name: &str) -> Result<Option<TaskMetadata>>;

    async fn create_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()>;

    async fn update_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()>;

    async fn delete_task(&self, cluster: &str, task_name: &str) -> Result<()>;

    // ---- search units ----

    async fn get_all_search_units(&self, cluster: &str) -> Result<Vec<SearchUnit>>;

    async fn get_search_unit(&self, cluster: &str, unit_name: &str)
        -> Result<Option<SearchUnit>>;

    async fn upsert_search_unit(
        &self,
        cluster: &str,
        unit_name: &str,
        unit: &SearchUnit,
    ) -> Result<()>;

    async fn delete_search_unit(&self, cluster: &str, unit_name: &str) -> Result<()>;

    // ---- search unit state ----

    /// Every published heartbeat, keyed by unit name. Documents that fail to
    /// parse are skipped, not fatal.
    async fn get_all_actual_states(
        &self,
        cluster: &str,
    ) -> Result<BTreeMap<String, SearchUnitActualState>>;

    async fn get_actual_state(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnitActualState>>;

    async fn get_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnitGoalState>>;

    async fn update_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
        goal_state: &SearchUnitGoalState,
    ) -> Result<()>;

    // ---- index catalogue ----

    async fn get_all_index_configs(&self, cluster: &str) -> Result<Vec<IndexConfig>>;

    async fn get_index_config(&self, cluster: &str, index: &str) -> Result<Option<IndexConfig>>;

    async fn create_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()>;

    async fn update_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()>;

    /// Removes the whole index subtree (conf, mappings, settings, and any
    /// remaining per-shard records)
    async fn delete_index_config(&self, cluster: &str, index: &str) -> Result<()>;

    async fn set_index_mappings(&self, cluster: &str, index: &str, mappings: &str) -> Result<()>;

    async fn set_index_settings(&self, cluster: &str, index: &str, settings: &str) -> Result<()>;

    // ---- shard allocations ----

    async fn get_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>>;

    async fn set_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()>;

    /// All planned allocations for one index
    async fn get_all_planned_allocations(
        &self,
        cluster: &str,
        index: &str,
    ) -> Result<Vec<ShardAllocation>>;

    async fn delete_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<()>;

    async fn get_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>>;

    async fn set_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()>;

    // ---- leadership ----

    /// Whether this process currently holds leadership for the cluster.
    /// Consulted at the top of every scheduler iteration and refreshed by
    /// the backend's election machinery.
    fn is_leader(&self, cluster: &str) -> bool;
}
