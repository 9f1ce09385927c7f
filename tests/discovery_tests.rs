//! Integration tests for node discovery and stale eviction

mod common;

use common::*;
use searchctl::discovery::Discovery;
use searchctl::models::{AdminState, HealthState, NodeRole, ShardState};
use searchctl::store::{MetadataStore, PathResolver};
use std::time::Duration;

#[tokio::test]
async fn heartbeats_materialise_conf_records() {
    let store = store();
    seed_heartbeat(&store, "coordinator-node-1", &{
        let mut state = heartbeat("coordinator-node-1", NodeRole::Coordinator, "COORDINATOR");
        state.address = "10.0.1.1".into();
        state
    })
    .await;
    seed_heartbeat(
        &store,
        "primary-node-1",
        &with_routing(
            heartbeat("primary-node-1", NodeRole::Primary, "0"),
            "idx",
            0,
            "primary",
            ShardState::Started,
        ),
    )
    .await;
    seed_heartbeat(&store, "replica-node-1", &heartbeat("replica-node-1", NodeRole::SearchReplica, "group-a"))
        .await;

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();

    let coordinator = store
        .get_search_unit(CLUSTER, "coordinator-node-1")
        .await
        .unwrap()
        .expect("coordinator conf");
    assert_eq!(coordinator.role, NodeRole::Coordinator);
    assert_eq!(coordinator.shard_pool_id, "COORDINATOR");
    assert_eq!(coordinator.host, "10.0.1.1");
    assert_eq!(coordinator.port_http, 9200);
    assert_eq!(coordinator.state_pulled, HealthState::Green);
    assert_eq!(coordinator.state_admin, AdminState::Normal);
    assert_eq!(coordinator.node_attributes["node.master"], "true");
    assert_eq!(coordinator.node_attributes["node.data"], "false");

    let primary = store
        .get_search_unit(CLUSTER, "primary-node-1")
        .await
        .unwrap()
        .expect("primary conf");
    assert_eq!(primary.role, NodeRole::Primary);
    assert_eq!(primary.shard_pool_id, "0");
    assert_eq!(primary.state_pulled, HealthState::Green);
    assert_eq!(primary.node_attributes["node.data"], "true");
    assert_eq!(primary.node_attributes["node.ingest"], "true");
    assert_eq!(primary.node_attributes["node.master"], "false");

    let replica = store
        .get_search_unit(CLUSTER, "replica-node-1")
        .await
        .unwrap()
        .expect("replica conf");
    assert_eq!(replica.role, NodeRole::SearchReplica);
    assert_eq!(replica.shard_pool_id, "group-a");
    assert_eq!(replica.node_attributes["node.ingest"], "false");
    // Healthy but idle (no routing yet) still counts as green
    assert_eq!(replica.state_pulled, HealthState::Green);
}

#[tokio::test]
async fn unhealthy_heartbeat_drains_the_node() {
    let store = store();
    seed_heartbeat(
        &store,
        "overloaded",
        &unhealthy_heartbeat("overloaded", NodeRole::Primary, "0"),
    )
    .await;

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();

    let unit = store
        .get_search_unit(CLUSTER, "overloaded")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.state_pulled, HealthState::Red);
    assert_eq!(unit.state_admin, AdminState::Drain);
}

#[tokio::test]
async fn rediscovery_without_changes_writes_nothing() {
    let store = store();
    seed_heartbeat(&store, "node-1", &heartbeat("node-1", NodeRole::Primary, "0")).await;

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();
    let after_first = store.write_count();

    discovery.discover_search_units().await.unwrap();
    assert_eq!(store.write_count(), after_first, "no observable change, no update");
}

#[tokio::test]
async fn changed_heartbeat_updates_the_record() {
    let store = store();
    seed_heartbeat(&store, "node-1", &heartbeat("node-1", NodeRole::Primary, "0")).await;

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();

    // Node degrades between cycles
    seed_heartbeat(
        &store,
        "node-1",
        &unhealthy_heartbeat("node-1", NodeRole::Primary, "0"),
    )
    .await;
    discovery.discover_search_units().await.unwrap();

    let unit = store.get_search_unit(CLUSTER, "node-1").await.unwrap().unwrap();
    assert_eq!(unit.state_pulled, HealthState::Red);
    assert_eq!(unit.state_admin, AdminState::Drain);
}

#[tokio::test]
async fn malformed_heartbeats_are_skipped_not_fatal() {
    let store = store();
    let paths = PathResolver::default();
    store.put_raw(
        &paths.search_unit_actual_state_path(CLUSTER, "broken"),
        "{definitely not json",
    );
    seed_heartbeat(&store, "healthy", &heartbeat("healthy", NodeRole::Primary, "0")).await;

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();

    assert!(store.get_search_unit(CLUSTER, "healthy").await.unwrap().is_some());
    assert!(store.get_search_unit(CLUSTER, "broken").await.unwrap().is_none());
}

#[tokio::test]
async fn heartbeat_without_role_is_skipped() {
    let store = store();
    let paths = PathResolver::default();
    store.put_raw(
        &paths.search_unit_actual_state_path(CLUSTER, "roleless"),
        r#"{"nodeName": "roleless", "memoryUsedPercent": 10, "diskAvailableMB": 9000}"#,
    );

    let discovery = Discovery::new(store.clone(), CLUSTER);
    discovery.discover_search_units().await.unwrap();
    assert!(store.get_search_unit(CLUSTER, "roleless").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_units_are_evicted_after_the_grace() {
    let store = store();
    // Unit conf exists but its heartbeat is gone
    seed_units(&store, &[healthy_replica("ghost", "group-a")]).await;

    let discovery = Discovery::with_stale_grace(store.clone(), CLUSTER, Duration::ZERO);
    discovery.evict_stale_units().await.unwrap();

    assert!(
        store.get_search_unit(CLUSTER, "ghost").await.unwrap().is_none(),
        "unit without a heartbeat must be evicted once the grace elapses"
    );
}

#[tokio::test]
async fn eviction_waits_for_the_grace_period() {
    let store = store();
    seed_units(&store, &[healthy_replica("ghost", "group-a")]).await;

    let discovery =
        Discovery::with_stale_grace(store.clone(), CLUSTER, Duration::from_secs(3600));
    discovery.evict_stale_units().await.unwrap();

    assert!(
        store.get_search_unit(CLUSTER, "ghost").await.unwrap().is_some(),
        "within the grace the unit must survive"
    );
}

#[tokio::test]
async fn units_with_live_heartbeats_are_never_evicted() {
    let store = store();
    seed_heartbeat(&store, "alive", &heartbeat("alive", NodeRole::SearchReplica, "group-a")).await;

    let discovery = Discovery::with_stale_grace(store.clone(), CLUSTER, Duration::ZERO);
    discovery.discover_search_units().await.unwrap();
    discovery.evict_stale_units().await.unwrap();

    assert!(store.get_search_unit(CLUSTER, "alive").await.unwrap().is_some());
}

#[tokio::test]
async fn drained_nodes_follow_the_same_eviction_rule() {
    let store = store();
    let mut drained = healthy_replica("drained", "group-a");
    drained.state_admin = AdminState::Drain;
    seed_units(&store, &[drained]).await;

    let discovery = Discovery::with_stale_grace(store.clone(), CLUSTER, Duration::ZERO);
    discovery.evict_stale_units().await.unwrap();
    assert!(store.get_search_unit(CLUSTER, "drained").await.unwrap().is_none());
}
