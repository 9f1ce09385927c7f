//! End-to-end reconciliation pipeline tests
//!
//! Drives the scheduler the way the controller binary does: heartbeats in,
//! conf records, planned allocations, goal states, and actual allocations
//! out, with idempotence and leadership gating observed through the store's
//! write counter.

mod common;

use common::*;
use searchctl::allocation::AllocationStrategy;
use searchctl::health::{ClusterHealthManager, HealthLevel};
use searchctl::indices::{CreateIndexRequest, IndexManager};
use searchctl::models::{HealthState, NodeRole, ShardState};
use searchctl::store::MetadataStore;
use searchctl::tasks::{TaskContext, TaskManager};
use std::sync::Arc;
use std::time::Duration;

fn manager(store: &Arc<searchctl::store::InMemoryMetadataStore>) -> TaskManager {
    let ctx = TaskContext::new(
        store.clone() as Arc<dyn MetadataStore>,
        CLUSTER,
        AllocationStrategy::RespectReplicaCount,
        Duration::from_secs(3600),
    );
    TaskManager::new(store.clone() as Arc<dyn MetadataStore>, ctx, Duration::from_secs(30))
}

async fn seed_cluster(store: &Arc<searchctl::store::InMemoryMetadataStore>) {
    seed_heartbeat(
        store,
        "p1",
        &with_routing(
            heartbeat("p1", NodeRole::Primary, "0"),
            "idx",
            0,
            "primary",
            ShardState::Started,
        ),
    )
    .await;
    seed_heartbeat(
        store,
        "r1",
        &with_routing(
            heartbeat("r1", NodeRole::SearchReplica, "0"),
            "idx",
            0,
            "search_replica",
            ShardState::Started,
        ),
    )
    .await;
    seed_heartbeat(
        store,
        "r2",
        &with_routing(
            heartbeat("r2", NodeRole::SearchReplica, "0"),
            "idx",
            0,
            "search_replica",
            ShardState::Started,
        ),
    )
    .await;
    seed_index(store, &index_with_replicas("idx", vec![2])).await;
}

#[tokio::test]
async fn full_pass_converges_the_cluster() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;

    // Discovery materialised the roster
    for unit in ["p1", "r1", "r2"] {
        assert!(
            store.get_search_unit(CLUSTER, unit).await.unwrap().is_some(),
            "unit {unit} should be discovered"
        );
    }

    // The allocator planned a writer and two readers
    let planned = store
        .get_planned_allocation(CLUSTER, "idx", "0")
        .await
        .unwrap()
        .expect("planned allocation");
    assert_eq!(planned.ingest_sus, vec!["p1"]);
    assert_eq!(planned.search_sus, vec!["r1", "r2"]);

    // The orchestrator inverted the plan into per-node goals
    let writer_goal = store.get_goal_state(CLUSTER, "p1").await.unwrap().unwrap();
    assert_eq!(writer_goal.shard_role("idx", "0"), Some(NodeRole::Primary));
    let reader_goal = store.get_goal_state(CLUSTER, "r1").await.unwrap().unwrap();
    assert_eq!(reader_goal.shard_role("idx", "0"), Some(NodeRole::SearchReplica));

    // The updater recorded the observed placement
    let actual = store
        .get_actual_allocation(CLUSTER, "idx", "0")
        .await
        .unwrap()
        .expect("actual allocation");
    assert_eq!(actual.ingest_sus, vec!["p1"]);
    assert_eq!(actual.search_sus, vec!["r1", "r2"]);
}

#[tokio::test]
async fn second_pass_performs_zero_writes() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;
    let after_first = store.write_count();

    manager.run_pass().await;
    assert_eq!(
        store.write_count(),
        after_first,
        "an unchanged cluster must not generate writes"
    );
}

#[tokio::test]
async fn goal_state_matches_recomputation_after_clean_pass() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;

    // Recompute the expected goal from the planned table and compare
    let planned = store
        .get_planned_allocation(CLUSTER, "idx", "0")
        .await
        .unwrap()
        .unwrap();
    for writer in &planned.ingest_sus {
        let goal = store.get_goal_state(CLUSTER, writer).await.unwrap().unwrap();
        assert_eq!(goal.shard_role("idx", "0"), Some(NodeRole::Primary));
    }
    for reader in &planned.search_sus {
        let goal = store.get_goal_state(CLUSTER, reader).await.unwrap().unwrap();
        assert_eq!(goal.shard_role("idx", "0"), Some(NodeRole::SearchReplica));
    }
}

#[tokio::test]
async fn non_leader_never_touches_the_store() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();

    store.set_leader(false);
    let before = store.write_count();
    manager.run_pass().await;
    assert_eq!(store.write_count(), before, "a follower must not write");

    store.set_leader(true);
    manager.run_pass().await;
    assert!(store.write_count() > before, "regaining leadership resumes the pipeline");
}

#[tokio::test]
async fn index_deletion_unwinds_allocations_and_goal_states() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;

    let index_manager = IndexManager::new(store.clone() as Arc<dyn MetadataStore>);
    index_manager.delete_index(CLUSTER, "idx").await.unwrap();

    // Every key under the index subtree is gone
    assert!(store.keys_with_prefix("/test-cluster/indices/idx/").is_empty());
    assert!(store.get_planned_allocation(CLUSTER, "idx", "0").await.unwrap().is_none());

    // Goal states no longer reference the deleted index
    for unit in ["p1", "r1", "r2"] {
        if let Some(goal) = store.get_goal_state(CLUSTER, unit).await.unwrap() {
            assert!(!goal.has_index("idx"), "unit {unit} still references idx");
        }
    }

    // Deletion is observable exactly once; the second call is a no-op
    let before = store.write_count();
    index_manager.delete_index(CLUSTER, "idx").await.unwrap();
    assert_eq!(store.write_count(), before);
}

#[tokio::test]
async fn index_creation_requires_a_roster_and_a_name() {
    let store = store();
    let index_manager = IndexManager::new(store.clone() as Arc<dyn MetadataStore>);

    let err = index_manager
        .create_index(
            CLUSTER,
            CreateIndexRequest {
                index_name: "".into(),
                ..Default::default()
            },
        )
        .await
        .expect_err("empty name must fail");
    assert_eq!(err.kind(), "invalid_request");

    let err = index_manager
        .create_index(
            CLUSTER,
            CreateIndexRequest {
                index_name: "idx".into(),
                ..Default::default()
            },
        )
        .await
        .expect_err("no roster must fail");
    assert_eq!(err.kind(), "invalid_request");

    seed_units(&store, &[healthy_primary("p1", "0")]).await;
    index_manager
        .create_index(
            CLUSTER,
            CreateIndexRequest {
                index_name: "idx".into(),
                mappings: Some(r#"{"properties":{}}"#.into()),
                shard_replica_count: Some(vec![2]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let index = store.get_index_config(CLUSTER, "idx").await.unwrap().unwrap();
    assert_eq!(index.shard_count(), 1);
    assert_eq!(index.replica_count(0), 2);

    // Creating it again is a harmless no-op
    let before = store.write_count();
    index_manager
        .create_index(
            CLUSTER,
            CreateIndexRequest {
                index_name: "idx".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(store.write_count(), before);
}

#[tokio::test]
async fn cluster_health_reflects_the_pipeline() {
    let store = store();
    seed_cluster(&store).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;

    let health = ClusterHealthManager::new(store.clone() as Arc<dyn MetadataStore>);

    let cluster_level = health
        .get_cluster_health(CLUSTER, HealthLevel::Cluster)
        .await
        .unwrap();
    assert_eq!(cluster_level.status, HealthState::Green);
    assert_eq!(cluster_level.number_of_nodes, 3);
    assert_eq!(cluster_level.number_of_data_nodes, 3);
    assert_eq!(cluster_level.active_nodes, 3);
    assert_eq!(cluster_level.number_of_indices, 1);
    assert_eq!(cluster_level.total_shards, 1);
    assert!(cluster_level.indices.is_none(), "cluster level omits the breakdown");

    let indices_level = health
        .get_cluster_health(CLUSTER, HealthLevel::Indices)
        .await
        .unwrap();
    let index_health = &indices_level.indices.as_ref().unwrap()["idx"];
    assert_eq!(index_health.status, HealthState::Green);
    assert!(index_health.shards.is_none(), "indices level omits shards");

    let shards_level = health
        .get_cluster_health(CLUSTER, HealthLevel::Shards)
        .await
        .unwrap();
    let shard_health =
        &shards_level.indices.as_ref().unwrap()["idx"].shards.as_ref().unwrap()["0"];
    assert!(shard_health.writer_assigned);
    assert_eq!(shard_health.started_readers, 2);
    assert_eq!(shard_health.status, HealthState::Green);
}

#[tokio::test]
async fn empty_cluster_reports_red() {
    let store = store();
    let health = ClusterHealthManager::new(store.clone() as Arc<dyn MetadataStore>);
    let report = health
        .get_cluster_health(CLUSTER, HealthLevel::Cluster)
        .await
        .unwrap();
    assert_eq!(report.status, HealthState::Red);
    assert_eq!(report.number_of_nodes, 0);
    assert_eq!(report.active_nodes, 0);
}

#[tokio::test]
async fn missing_writer_reports_red_shard() {
    let store = store();
    // Replicas only; the writer pool is empty
    seed_heartbeat(&store, "r1", &heartbeat("r1", NodeRole::SearchReplica, "0")).await;
    seed_index(&store, &index_with_replicas("idx", vec![1])).await;

    let manager = manager(&store);
    manager.seed_default_tasks().await.unwrap();
    manager.run_pass().await;

    let health = ClusterHealthManager::new(store.clone() as Arc<dyn MetadataStore>);
    let report = health
        .get_cluster_health(CLUSTER, HealthLevel::Shards)
        .await
        .unwrap();
    assert_eq!(report.status, HealthState::Red);
    let shard = &report.indices.as_ref().unwrap()["idx"].shards.as_ref().unwrap()["0"];
    assert!(!shard.writer_assigned);
    assert_eq!(shard.status, HealthState::Red);
}

#[tokio::test]
async fn index_health_for_unknown_index_is_a_typed_error() {
    let store = store();
    let health = ClusterHealthManager::new(store.clone() as Arc<dyn MetadataStore>);
    let err = health
        .get_index_health(CLUSTER, "nope", HealthLevel::Indices)
        .await
        .expect_err("unknown index");
    assert_eq!(err.kind(), "index_not_found");
}
