//! Cluster health derivation
//!
//! Stateless: every report is computed from the current heartbeats, the
//! index catalogue, and the planned-allocation table. Three granularity
//! levels nest successively finer breakdowns.

use crate::models::{HealthState, NodeRole, SearchUnitActualState, ShardState};
use crate::store::MetadataStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Report granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    Cluster,
    Indices,
    Shards,
}

impl std::str::FromStr for HealthLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cluster" => Ok(Self::Cluster),
            "indices" => Ok(Self::Indices),
            "shards" => Ok(Self::Shards),
            other => Err(Error::InvalidRequest(format!(
                "unknown health level '{other}', expected cluster|indices|shards"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterHealthInfo {
    pub cluster_name: String,
    pub status: HealthState,
    pub number_of_nodes: usize,
    pub number_of_data_nodes: usize,
    pub active_nodes: usize,
    pub number_of_indices: usize,
    pub total_shards: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<BTreeMap<String, IndexHealthInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealthInfo {
    pub status: HealthState,
    pub number_of_shards: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards: Option<BTreeMap<String, ShardHealthInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardHealthInfo {
    pub status: HealthState,
    pub writer_assigned: bool,
    pub started_readers: usize,
    pub configured_replicas: usize,
}

pub struct ClusterHealthManager {
    store: Arc<dyn MetadataStore>,
}

impl ClusterHealthManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Derive cluster health at the requested granularity.
    pub async fn get_cluster_health(
        &self,
        cluster: &str,
        level: HealthLevel,
    ) -> Result<ClusterHealthInfo> {
        if cluster.trim().is_empty() {
            return Err(Error::InvalidRequest("cluster id must not be empty".into()));
        }

        let states = self.store.get_all_actual_states(cluster).await?;
        let index_configs = self.store.get_all_index_configs(cluster).await?;

        let number_of_nodes = states.len();
        let number_of_data_nodes = states
            .values()
            .filter(|state| state.role != Some(NodeRole::Coordinator))
            .count();
        let active_nodes = states
            .values()
            .filter(|state| state.derive_health() != HealthState::Red)
            .count();

        let mut indices = BTreeMap::new();
        let mut total_shards = 0usize;
        let mut status = if active_nodes == 0 {
            HealthState::Red
        } else {
            HealthState::Green
        };

        for index in &index_configs {
            total_shards += index.shard_count();
            let index_health = self.derive_index_health(cluster, index, &states, level).await?;
            status = status.min(index_health.status);
            indices.insert(index.index_name.clone(), index_health);
        }

        Ok(ClusterHealthInfo {
            cluster_name: cluster.to_string(),
            status,
            number_of_nodes,
            number_of_data_nodes,
            active_nodes,
            number_of_indices: index_configs.len(),
            total_shards,
            indices: match level {
                HealthLevel::Cluster => None,
                HealthLevel::Indices | HealthLevel::Shards => Some(indices),
            },
        })
    }

    /// Health of one index; fails with a typed error when it does not exist.
    pub async fn get_index_health(
        &self,
        cluster: &str,
        index_name: &str,
        level: HealthLevel,
    ) -> Result<IndexHealthInfo> {
        let Some(index) = self.store.get_index_config(cluster, index_name).await? else {
            return Err(Error::IndexNotFound(index_name.to_string()));
        };
        let states = self.store.get_all_actual_states(cluster).await?;
        self.derive_index_health(cluster, &index, &states, level).await
    }

    async fn derive_index_health(
        &self,
        cluster: &str,
        index: &crate::models::IndexConfig,
        states: &BTreeMap<String, SearchUnitActualState>,
        level: HealthLevel,
    ) -> Result<IndexHealthInfo> {
        let mut shards = BTreeMap::new();
        let mut status = HealthState::Green;

        for shard in 0..index.shard_count() {
            let shard_id = shard.to_string();
            let planned = self
                .store
                .get_planned_allocation(cluster, &index.index_name, &shard_id)
                .await?;
            let writer_assigned = planned
                .as_ref()
                .map(|alloc| !alloc.ingest_sus.is_empty())
                .unwrap_or(false);
            let started_readers = count_started_readers(states, &index.index_name, shard as u32);
            let configured_replicas = index.replica_count(shard) as usize;

            let shard_status = if !writer_assigned {
                HealthState::Red
            } else if started_readers >= configured_replicas {
                HealthState::Green
            } else {
                HealthState::Yellow
            };
            status = status.min(shard_status);

            shards.insert(
                shard_id,
                ShardHealthInfo {
                    status: shard_status,
                    writer_assigned,
                    started_readers,
                    configured_replicas,
                },
            );
        }

        Ok(IndexHealthInfo {
            status,
            number_of_shards: index.shard_count(),
            shards: match level {
                HealthLevel::Shards => Some(shards),
                _ => None,
            },
        })
    }
}

/// Distinct nodes serving a STARTED reader copy of (index, shard)
fn count_started_readers(
    states: &BTreeMap<String, SearchUnitActualState>,
    index_name: &str,
    shard_id: u32,
) -> usize {
    states
        .values()
        .filter(|state| {
            state
                .node_routing
                .get(index_name)
                .map(|routings| {
                    routings.iter().any(|routing| {
                        routing.shard_id == shard_id
                            && !routing.is_primary()
                            && routing.state == ShardState::Started
                    })
                })
                .unwrap_or(false)
        })
        .count()
}
