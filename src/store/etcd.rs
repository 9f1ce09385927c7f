//! etcd-backed metadata store
//!
//! One etcd client serves every cluster this controller manages. Each call
//! carries its own timeout; prefix queries append a trailing slash so
//! `/c/indices/idx` never matches `/c/indices/idx2`. Leader election runs a
//! lease-backed campaign per cluster and drops the leader flag the moment
//! keep-alive stops confirming the lease.

use super::paths::PathResolver;
use super::MetadataStore;
use crate::models::{
    IndexConfig, SearchUnit, SearchUnitActualState, SearchUnitGoalState, ShardAllocation,
    TaskMetadata,
};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use etcd_client::{Client, DeleteOptions, GetOptions, GetResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-call store timeout in seconds
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 5;

/// etcd metadata store backend.
pub struct EtcdMetadataStore {
    client: Client,
    paths: Arc<PathResolver>,
    node_id: String,
    op_timeout: Duration,
    election_ttl_secs: i64,
    leaders: DashMap<String, Arc<AtomicBool>>,
}

impl EtcdMetadataStore {
    /// Connect to the etcd endpoints. `node_id` is this process's identity
    /// in leader elections.
    pub async fn connect(
        endpoints: &[String],
        node_id: &str,
        paths: Arc<PathResolver>,
        op_timeout: Duration,
        election_ttl_secs: i64,
    ) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        info!(
            endpoints = %endpoints.join(","),
            node_id,
            "Connected to etcd metadata store"
        );
        Ok(Self {
            client,
            paths,
            node_id: node_id.to_string(),
            op_timeout,
            election_ttl_secs,
            leaders: DashMap::new(),
        })
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = std::result::Result<T, etcd_client::Error>>) -> Result<T> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::from)
    }

    async fn kv_get(&self, key: String) -> Result<GetResponse> {
        let mut kv = self.client.kv_client();
        self.with_timeout(async move { kv.get(key, None).await }).await
    }

    async fn kv_get_prefix(&self, prefix: String) -> Result<GetResponse> {
        // Trailing slash keeps the prefix match precise
        let prefix = format!("{prefix}/");
        let mut kv = self.client.kv_client();
        self.with_timeout(async move {
            kv.get(prefix, Some(GetOptions::new().with_prefix())).await
        })
        .await
    }

    async fn kv_put(&self, key: String, value: String) -> Result<()> {
        let mut kv = self.client.kv_client();
        self.with_timeout(async move { kv.put(key, value, None).await })
            .await?;
        Ok(())
    }

    async fn kv_delete(&self, key: String) -> Result<()> {
        let mut kv = self.client.kv_client();
        self.with_timeout(async move { kv.delete(key, None).await })
            .await?;
        Ok(())
    }

    async fn kv_delete_prefix(&self, prefix: String) -> Result<()> {
        let prefix = format!("{prefix}/");
        let mut kv = self.client.kv_client();
        self.with_timeout(async move {
            kv.delete(prefix, Some(DeleteOptions::new().with_prefix())).await
        })
        .await?;
        Ok(())
    }

    async fn put_json<T: Serialize>(&self, key: String, value: &T) -> Result<()> {
        self.kv_put(key, serde_json::to_string(value)?).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>> {
        let resp = self.kv_get(key).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_str(kv.value_str()?)?)),
            None => Ok(None),
        }
    }

    /// Deserialize every value in a prefix response whose key ends with
    /// `suffix`; unparseable documents are skipped.
    fn parse_list<T: DeserializeOwned>(resp: &GetResponse, suffix: &str) -> Vec<(String, T)> {
        let mut items = Vec::new();
        for kv in resp.kvs() {
            let key = match kv.key_str() {
                Ok(key) => key,
                Err(_) => continue,
            };
            if !key.ends_with(suffix) {
                continue;
            }
            match kv.value_str().map_err(Error::from).and_then(|json| {
                serde_json::from_str::<T>(json).map_err(Error::from)
            }) {
                Ok(value) => items.push((key.to_string(), value)),
                Err(e) => warn!(key = %key, error = %e, "Skipping unparseable document"),
            }
        }
        items
    }

    fn leader_flag(&self, cluster: &str) -> Arc<AtomicBool> {
        self.leaders
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// Campaign for cluster leadership in the background. The returned
    /// handle lives as long as the process; the loop re-campaigns with a
    /// short backoff whenever the lease is lost.
    pub fn start_leader_election(self: Arc<Self>, cluster: &str) -> tokio::task::JoinHandle<()> {
        let store = self;
        let cluster = cluster.to_string();
        tokio::spawn(async move {
            loop {
                if let Err(e) = store.campaign_and_hold(&cluster).await {
                    warn!(cluster = %cluster, error = %e, "Leadership lost, will re-campaign");
                }
                store.leader_flag(&cluster).store(false, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }

    /// One full leadership tenure: grant a lease, win the campaign, then
    /// keep the lease alive until it fails. Returns only on loss.
    async fn campaign_and_hold(&self, cluster: &str) -> Result<()> {
        let mut lease_client = self.client.lease_client();
        let lease = lease_client.grant(self.election_ttl_secs, None).await?;
        let lease_id = lease.id();
        let (mut keeper, mut responses) = lease_client.keep_alive(lease_id).await?;

        let election_key = self.paths.leader_election_path(cluster);
        let mut election = self.client.election_client();
        debug!(cluster, key = %election_key, "Campaigning for leadership");
        election
            .campaign(election_key, self.node_id.clone(), lease_id)
            .await?;

        info!(cluster, node_id = %self.node_id, "This node is the leader");
        self.leader_flag(cluster).store(true, Ordering::SeqCst);

        let refresh = Duration::from_secs((self.election_ttl_secs as u64 / 3).max(1));
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            keeper.keep_alive().await?;
            match responses.message().await? {
                Some(resp) if resp.ttl() > 0 => {}
                _ => return Err(Error::Internal("leader lease expired".to_string())),
            }
        }
    }
}

#[async_trait]
impl MetadataStore for EtcdMetadataStore {
    async fn get_all_tasks(&self, cluster: &str) -> Result<Vec<TaskMetadata>> {
        let resp = self
            .kv_get_prefix(self.paths.controller_tasks_prefix(cluster))
            .await?;
        let mut tasks: Vec<TaskMetadata> = Self::parse_list(&resp, "")
            .into_iter()
            .map(|(_, task)| task)
            .collect();
        tasks.sort_by_key(|task| task.priority);
        Ok(tasks)
    }

    async fn get_task(&self, cluster: &str, task_name: &str) -> Result<Option<TaskMetadata>> {
        self.get_json(self.paths.controller_task_path(cluster, task_name)).await
    }

    async fn create_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()> {
        self.put_json(self.paths.controller_task_path(cluster, &task.name), task)
            .await
    }

    async fn update_task(&self, cluster: &str, task: &TaskMetadata) -> Result<()> {
        self.put_json(self.paths.controller_task_path(cluster, &task.name), task)
            .await
    }

    async fn delete_task(&self, cluster: &str, task_name: &str) -> Result<()> {
        self.kv_delete(self.paths.controller_task_path(cluster, task_name)).await
    }

    async fn get_all_search_units(&self, cluster: &str) -> Result<Vec<SearchUnit>> {
        let resp = self
            .kv_get_prefix(self.paths.search_units_prefix(cluster))
            .await?;
        Ok(Self::parse_list(&resp, "/conf")
            .into_iter()
            .map(|(_, unit)| unit)
            .collect())
    }

    async fn get_search_unit(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnit>> {
        self.get_json(self.paths.search_unit_conf_path(cluster, unit_name)).await
    }

    async fn upsert_search_unit(
        &self,
        cluster: &str,
        unit_name: &str,
        unit: &SearchUnit,
    ) -> Result<()> {
        self.put_json(self.paths.search_unit_conf_path(cluster, unit_name), unit)
            .await
    }

    async fn delete_search_unit(&self, cluster: &str, unit_name: &str) -> Result<()> {
        self.kv_delete_prefix(format!(
            "{}/{}",
            self.paths.search_units_prefix(cluster),
            unit_name
        ))
        .await
    }

    async fn get_all_actual_states(
        &self,
        cluster: &str,
    ) -> Result<BTreeMap<String, SearchUnitActualState>> {
        let prefix = self.paths.search_units_prefix(cluster);
        let resp = self.kv_get_prefix(prefix.clone()).await?;
        let prefix = format!("{prefix}/");
        let states = Self::parse_list::<SearchUnitActualState>(&resp, "/actual-state")
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
        self.get_json(self.paths.search_unit_actual_state_path(cluster, unit_name))
            .await
    }

    async fn get_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
    ) -> Result<Option<SearchUnitGoalState>> {
        self.get_json(self.paths.search_unit_goal_state_path(cluster, unit_name))
            .await
    }

    async fn update_goal_state(
        &self,
        cluster: &str,
        unit_name: &str,
        goal_state: &SearchUnitGoalState,
    ) -> Result<()> {
        self.put_json(
            self.paths.search_unit_goal_state_path(cluster, unit_name),
            goal_state,
        )
        .await
    }

    async fn get_all_index_configs(&self, cluster: &str) -> Result<Vec<IndexConfig>> {
        let resp = self.kv_get_prefix(self.paths.indices_prefix(cluster)).await?;
        Ok(Self::parse_list(&resp, "/conf")
            .into_iter()
            .map(|(_, index)| index)
            .collect())
    }

    async fn get_index_config(
        &self,
        cluster: &str,
        index: &str,
    ) -> Result<Option<IndexConfig>> {
        self.get_json(self.paths.index_conf_path(cluster, index)).await
    }

    async fn create_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()> {
        self.put_json(self.paths.index_conf_path(cluster, &index.index_name), index)
            .await
    }

    async fn update_index_config(&self, cluster: &str, index: &IndexConfig) -> Result<()> {
        self.put_json(self.paths.index_conf_path(cluster, &index.index_name), index)
            .await
    }

    async fn delete_index_config(&self, cluster: &str, index: &str) -> Result<()> {
        self.kv_delete_prefix(self.paths.index_prefix(cluster, index)).await
    }

    async fn set_index_mappings(
        &self,
        cluster: &str,
        index: &str,
        mappings: &str,
    ) -> Result<()> {
        self.kv_put(
            self.paths.index_mappings_path(cluster, index),
            mappings.to_string(),
        )
        .await
    }

    async fn set_index_settings(
        &self,
        cluster: &str,
        index: &str,
        settings: &str,
    ) -> Result<()> {
        self.kv_put(
            self.paths.index_settings_path(cluster, index),
            settings.to_string(),
        )
        .await
    }

    async fn get_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>> {
        self.get_json(self.paths.shard_planned_allocation_path(cluster, index, shard_id))
            .await
    }

    async fn set_planned_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()> {
        self.put_json(
            self.paths.shard_planned_allocation_path(cluster, index, shard_id),
            allocation,
        )
        .await
    }

    async fn get_all_planned_allocations(
        &self,
        cluster: &str,
        index: &str,
    ) -> Result<Vec<ShardAllocation>> {
        let resp = self
            .kv_get_prefix(self.paths.index_prefix(cluster, index))
            .await?;
        Ok(Self::parse_list(&resp, "/planned-allocation")
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
        self.kv_delete(self.paths.shard_planned_allocation_path(cluster, index, shard_id))
            .await
    }

    async fn get_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> Result<Option<ShardAllocation>> {
        self.get_json(self.paths.shard_actual_allocation_path(cluster, index, shard_id))
            .await
    }

    async fn set_actual_allocation(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
        allocation: &ShardAllocation,
    ) -> Result<()> {
        self.put_json(
            self.paths.shard_actual_allocation_path(cluster, index, shard_id),
            allocation,
        )
        .await
    }

    fn is_leader(&self, cluster: &str) -> bool {
        self.leaders
            .get(cluster)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}
