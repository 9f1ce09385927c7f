//! searchctl controller binary
//!
//! One process per controller node. Campaigns for per-cluster leadership
//! and, while leading, runs the reconciliation pipeline on a fixed tick.

use clap::Parser;
use searchctl::allocation::AllocationStrategy;
use searchctl::config::ControllerConfig;
use searchctl::store::{EtcdMetadataStore, PathResolver};
use searchctl::tasks::{TaskContext, TaskManager};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// searchctl cluster controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Allocation strategy for reader placement
    #[arg(long, env = "ALLOCATION_STRATEGY", default_value = "USE_ALL_AVAILABLE_NODES")]
    strategy: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .json()
        .init();

    let strategy: AllocationStrategy = args.strategy.parse()?;
    let config = ControllerConfig::from_env()?;
    info!(
        cluster = %config.cluster_name,
        node = %config.node_name,
        runtime_env = %config.runtime_env,
        "Starting searchctl controller"
    );

    let paths = Arc::new(PathResolver::new(&config.runtime_env));
    let store = Arc::new(
        EtcdMetadataStore::connect(
            &config.etcd_endpoints,
            &config.node_name,
            paths,
            config.op_timeout,
            config.election_ttl_secs,
        )
        .await?,
    );

    // Leadership gates every pipeline write; campaign before scheduling
    Arc::clone(&store).start_leader_election(&config.cluster_name);

    let ctx = TaskContext::new(
        store.clone(),
        &config.cluster_name,
        strategy,
        config.stale_grace,
    );
    let manager = Arc::new(TaskManager::new(store.clone(), ctx, config.task_interval));
    manager.seed_default_tasks().await?;
    let scheduler = manager.start();

    signal::ctrl_c().await?;
    info!("Shutting down");
    scheduler.abort();
    Ok(())
}
