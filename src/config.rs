//! Controller configuration from the environment
//!
//! Environment variables:
//! - `CLUSTER_NAME`: cluster label (default "search-cluster")
//! - `ETCD_ENDPOINTS`: comma-separated store URLs (default "http://127.0.0.1:2379")
//! - `NODE_NAME`: this process's identity; required, startup fails without it
//! - `RUNTIME_ENV`: environment label for multi-cluster paths (default "staging")
//! - `TASK_INTERVAL_SECONDS`: scheduler tick (default 30)
//! - `LEADER_ELECTION_TTL_SECONDS`: election lease TTL (default 10)
//! - `ETCD_OPERATION_TIMEOUT_SECONDS`: per-call store timeout (default 5)
//! - `STALE_GRACE_SECONDS`: heartbeat absence before eviction (default 60)

use crate::{Error, Result};
use std::time::Duration;

/// Runtime configuration for one controller process.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub cluster_name: String,
    pub etcd_endpoints: Vec<String>,
    pub node_name: String,
    pub runtime_env: String,
    pub task_interval: Duration,
    pub election_ttl_secs: i64,
    pub op_timeout: Duration,
    pub stale_grace: Duration,
}

impl ControllerConfig {
    /// Build configuration from the environment. The node name is the only
    /// required setting; a controller without an identity cannot campaign.
    pub fn from_env() -> Result<Self> {
        let node_name = std::env::var("NODE_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::Config("NODE_NAME is required".to_string()))?;

        let cluster_name =
            env_or("CLUSTER_NAME", "search-cluster");
        let etcd_endpoints: Vec<String> = env_or("ETCD_ENDPOINTS", "http://127.0.0.1:2379")
            .split(',')
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .collect();
        if etcd_endpoints.is_empty() {
            return Err(Error::Config("ETCD_ENDPOINTS must not be empty".to_string()));
        }

        Ok(Self {
            cluster_name,
            etcd_endpoints,
            node_name: node_name.trim().to_string(),
            runtime_env: env_or("RUNTIME_ENV", crate::store::DEFAULT_RUNTIME_ENV),
            task_interval: Duration::from_secs(env_parsed("TASK_INTERVAL_SECONDS", 30)?),
            election_ttl_secs: env_parsed("LEADER_ELECTION_TTL_SECONDS", 10)? as i64,
            op_timeout: Duration::from_secs(env_parsed(
                "ETCD_OPERATION_TIMEOUT_SECONDS",
                crate::store::DEFAULT_OP_TIMEOUT_SECS,
            )?),
            stale_grace: Duration::from_secs(env_parsed("STALE_GRACE_SECONDS", 60)?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a positive integer, got '{value}'"))),
        Err(_) => Ok(default),
    }
}
