//! Shared fixtures for integration tests
#![allow(dead_code)]

use searchctl::models::{
    AdminState, HealthState, NodeRole, SearchUnit, SearchUnitActualState, ShardAllocation,
    ShardRouting, ShardState,
};
use searchctl::models::IndexConfig;
use searchctl::store::{InMemoryMetadataStore, MetadataStore, PathResolver};
use std::sync::Arc;

pub const CLUSTER: &str = "test-cluster";

pub fn store() -> Arc<InMemoryMetadataStore> {
    Arc::new(InMemoryMetadataStore::new())
}

pub fn healthy_replica(name: &str, pool: &str) -> SearchUnit {
    SearchUnit {
        name: name.to_string(),
        host: "localhost".into(),
        port_http: 9200,
        port_transport: 9300,
        cluster_name: CLUSTER.into(),
        role: NodeRole::SearchReplica,
        shard_pool_id: pool.to_string(),
        zone: None,
        state_admin: AdminState::Normal,
        state_pulled: HealthState::Green,
        node_attributes: Default::default(),
    }
}

pub fn healthy_primary(name: &str, pool: &str) -> SearchUnit {
    SearchUnit {
        role: NodeRole::Primary,
        ..healthy_replica(name, pool)
    }
}

pub fn red(mut unit: SearchUnit) -> SearchUnit {
    unit.state_pulled = HealthState::Red;
    unit
}

pub async fn seed_units(store: &Arc<InMemoryMetadataStore>, units: &[SearchUnit]) {
    for unit in units {
        store
            .upsert_search_unit(CLUSTER, &unit.name, unit)
            .await
            .expect("seed unit");
    }
}

pub fn index_with_replicas(name: &str, replica_counts: Vec<u32>) -> IndexConfig {
    IndexConfig::new(name, replica_counts)
}

pub fn index_with_groups(name: &str, replica_counts: Vec<u32>, group_counts: Vec<u32>) -> IndexConfig {
    let mut index = IndexConfig::new(name, replica_counts);
    index.settings.shard_groups_allocate_count = Some(group_counts);
    index
}

pub async fn seed_index(store: &Arc<InMemoryMetadataStore>, index: &IndexConfig) {
    store
        .create_index_config(CLUSTER, index)
        .await
        .expect("seed index");
}

pub fn planned(index: &str, shard: &str, ingest: &[&str], search: &[&str]) -> ShardAllocation {
    let mut allocation = ShardAllocation::new(index, shard);
    allocation.ingest_sus = ingest.iter().map(|s| s.to_string()).collect();
    allocation.search_sus = search.iter().map(|s| s.to_string()).collect();
    allocation
}

/// A healthy heartbeat with no routing (a freshly joined, idle node)
pub fn heartbeat(name: &str, role: NodeRole, pool: &str) -> SearchUnitActualState {
    SearchUnitActualState {
        node_name: name.to_string(),
        address: "10.0.1.1".into(),
        http_port: 9200,
        transport_port: 9300,
        node_id: format!("node-id-{name}"),
        ephemeral_id: format!("ephemeral-{name}"),
        memory_used_percent: 25,
        memory_used_mb: 1000,
        memory_max_mb: 4000,
        heap_used_percent: 25,
        disk_total_mb: 100_000,
        disk_available_mb: 80_000,
        cpu_used_percent: 20,
        role: Some(role),
        shard_pool_id: Some(pool.to_string()),
        cluster_name: CLUSTER.into(),
        ..Default::default()
    }
}

pub fn unhealthy_heartbeat(name: &str, role: NodeRole, pool: &str) -> SearchUnitActualState {
    let mut state = heartbeat(name, role, pool);
    state.memory_used_percent = 95;
    state.disk_available_mb = 500;
    state
}

/// Attach a started shard copy to a heartbeat's routing table
pub fn with_routing(
    mut state: SearchUnitActualState,
    index: &str,
    shard_id: u32,
    role: &str,
    shard_state: ShardState,
) -> SearchUnitActualState {
    state
        .node_routing
        .entry(index.to_string())
        .or_default()
        .push(ShardRouting::new(shard_id, role, shard_state));
    state
}

pub async fn seed_heartbeat(
    store: &Arc<InMemoryMetadataStore>,
    name: &str,
    state: &SearchUnitActualState,
) {
    let paths = PathResolver::default();
    store.put_raw(
        &paths.search_unit_actual_state_path(CLUSTER, name),
        &serde_json::to_string(state).expect("serialize heartbeat"),
    );
}

/// Group label convention in these tests: node "b-2" belongs to group "b"
pub fn group_of(node_name: &str) -> &str {
    node_name.split('-').next().unwrap_or(node_name)
}

pub fn distinct_groups(names: &[String]) -> usize {
    names
        .iter()
        .map(|name| group_of(name))
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}
