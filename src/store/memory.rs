//! In-memory metadata store for development and testing
//!
//! Stores raw JSON documents in a sorted map keyed by the same resolver
//! paths the etcd backend uses, so prefix scans and the key-layout contract
//! are exercised even in tests. Tracks every mutation so idempotence
//! properties can be asserted as "zero writes on the second pass".

use super::paths::PathResolver;
use super::MetadataStore;
use crate::models::{
    IndexConfig, SearchUnit, SearchUnitActualState, SearchUnitGoalState, ShardAllocation,
    TaskMetadata,
};
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// In-memory metadata store backend.
pub struct InMemoryMetadataStore {
    kv: RwLock<BTreeMap<String, String>>,
    paths: Arc<PathResolver>,
    writes: AtomicU64,
    leader: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::with_paths(Arc::new(PathResolver::default()))
    }

    pub fn with_paths(paths: Arc<PathResolver>) -> Self {
        Self {
            kv: RwLock::new(BTreeMap::new()),
            paths,
            writes: AtomicU64::new(0),
            leader: AtomicBool::new(true),
        }
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Mutations performed so far (puts and deletes)
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Flip the leader flag; lets tests exercise leadership gating
    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::Relaxed);
    }

    /// Store a raw document at a path, bypassing typed serialization.
    /// Tests use this to seed heartbeats or malformed payloads.
    pub fn put_raw(&self, path: &str, value: &str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.kv.write().insert(path.to_string(), value.to_string());
    }

    pub fn get_raw(&self, path: &str) -> Option<String> {
        self.kv.read().get(path).cloned()
    }

    /// All keys currently stored under a prefix
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.kv
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn put<T: Serialize>(&self, path: String, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.kv.write().insert(path, json);
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.kv.read().get(path) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, path: &str) {
        if self.kv.write().remove(path).is_some() {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn delete_prefix(&self, prefix: &str) {
        let keys = self.keys_with_prefix(prefix);
        if keys.is_empty() {
            return;
        }
        let mut kv = self.kv.write();
        for key in keys {
            kv.remove(&key);
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Parse every document under `prefix` whose key ends with `suffix`,
    /// skipping documents that fail to parse.
    fn scan<T: DeserializeOwned>(&self, prefix: &str, suffix: &str) -> Vec<(String, T)> {
        let kv = self.kv.read();
        kv.range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| key.ends_with(suffix))
            .filter_map(|(key, json)| match serde_json::from_str::<T>(json) {
                Ok(value) => Some((key.clone(), value)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unparseable document");
                    None
                }
            })
            .collect()
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_all_tasks(&self, cluster: &str) -> Result<Vec<TaskMetadata>> {
        let prefix = format!("{}/", self.paths.controller_tasks_prefix(cluster));
        let mut tasks: Vec<TaskMetadata> =
            self.scan(&prefix, "").into_iter().map(|(_, task)| task).collect();
        tasks.sort_by_key(|task| task.priority);
        Ok(tasks)
    }

    async fn get_task(&self, cluster: &str, task_name: &str) -> Result<Option<TaskMetadata>> {
        self.get(&self.paths.controller_task_path(cluster, task_name))
    }

    async fn create_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()> {
        self.put(self.paths.controller_task_path(cluster, &task.name), task)
    }

    async fn update_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()> {
        self.put(self.paths.controller_task_path(cluster, &task.name), task)
    }

    async fn delete_task(&self, cluster: &str, task_name: &str) -> Result<()> {
        self.delete(&self.paths.controller_task_path(cluster, task_name));
        Ok(())
    }

    async fn get_all_search_units(&self, cluster: &str) -> Result<Vec<SearchUnit>> {
        let prefix = format!("{}/", self.paths.search_units_prefix(cluster));
        Ok(self.scan(&prefix, "/conf").into_iter().map(|(_, unit)| unit).collect())
    }

    async fn get_search_unit(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnit>> {
        self.get(&self.paths.search_unit_conf_path(cluster, unit_name))
    }

    async fn upsert_search_unit(
        &self,
        cluster: &str,
        unit_name: &str,
        unit: &SearchUnit,
    ) -> Result<()> {
        self.put(self.paths.search_unit_conf_path(cluster, unit_name), unit)
    }

    async fn delete_search_unit(&self, cluster: &str, unit_name: &str) -> Result<()> {
        let prefix = format!("{}/{}/", self.paths.search_units_prefix(cluster), unit_name);
        self.delete_prefix(&prefix);
        Ok(())
    }

    async fn get_all_actual_states(
        &self,
        cluster: &str,
    ) -> Result<BTreeMap<String, SearchUnitActualState>> {
        let prefix = format!("{}/", self.paths.search_units_prefix(cluster));
        let states = self
            .scan::<SearchUnitActualState>(&prefix, "/actual-state")
            .into_iter()
            .filter_map(|(key, state)| {
                let relative = key.strip_prefix(&prefix)?;
                let unit_name = relative.split('/').next()?.to_string();
                Some((unit_name, state))
            })
            .collect();
        Ok(states)
    }

    async fn get_actual_state(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnitActualState>> {
        self.get(&self.paths.search_unit_actual_state_path(cluster, unit_name))
    }

    async fn get_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnitGoalState>> {
        self.get(&self.paths.search_unit_goal_state_path(cluster, unit_name))
    }

    async fn update_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
        goal_state: &SearchUnitGoalState,
    ) -> Result<()> {
        self.put(
            self.paths.search_unit_goal_state_path(cluster, unit_name),
            goal_state,
        )
    }

    async fn get_all_index_configs(&self, cluster: &str) -> Result<Vec<IndexConfig>> {
        let prefix = format!("{}/", self.paths.indices_prefix(cluster));
        Ok(self.scan(&prefix, "/conf").into_iter().map(|(_, index)| index).collect())
    }

    async fn get_index_config(
        &self,
        cluster: &str,
        index: &str,
    ) -> Result<Option<IndexConfig>> {
        self.get(&self.paths.index_conf_path(cluster, index))
    }

    async fn create_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()> {
        self.put(self.paths.index_conf_path(cluster, &index.index_name), index)
    }

    async fn update_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()> {
        self.put(self.paths.index_conf_path(cluster, &index.index_name), index)
    }

    async fn delete_index_config(&self, cluster: &str, index: &str) -> Result<()> {
        let prefix = format!("{}/", self.paths.index_prefix(cluster, index));
        self.delete_prefix(&prefix);
        Ok(())
    }

    async fn set_index_mappings(
        &self,
        cluster: &str,
        index: &str,
        mappings: &str,
    ) -> Result<()> {
        self.put_raw(&self.paths.index_mappings_path(cluster, index), mappings);
        Ok(())
    }

    async fn set_index_settings(
        &self,
        cluster: &str,
        index: &str,
        settings: &str,
    ) -> Result<()> {
        self.put_raw(&self.paths.index_settings_path(cluster, index), settings);
        Ok(())
    }

    async fn get_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>> {
        self.get(&self.paths.shard_planned_allocation_path(cluster, index, shard_id))
    }

    async fn set_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()> {
        self.put(
            self.paths.shard_planned_allocation_path(cluster, index, shard_id),
            allocation,
        )
    }

    async fn get_all_planned_allocations(
        &self,
        cluster: &str,
        index: &str,
    ) -> Result<Vec<ShardAllocation>> {
        let prefix = format!("{}/", self.paths.index_prefix(cluster, index));
        Ok(self
            .scan(&prefix, "/planned-allocation")
            .into_iter()
            .map(|(_, allocation)| allocation)
            .collect())
    }

    async fn delete_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<()> {
        self.delete(&self.paths.shard_planned_allocation_path(cluster, index, shard_id));
        Ok(())
    }

    async fn get_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>> {
        self.get(&self.paths.shard_actual_allocation_path(cluster, index, shard_id))
    }

    async fn set_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()> {
        self.put(
            self.paths.shard_actual_allocation_path(cluster, index, shard_id),
            allocation,
        )
    }

    fn is_leader(&self, _cluster: &str) -> bool {
        self.leader.load(Ordering::Relaxed)
    }
}
