//! Worker heartbeat document
//!
//! Published by every worker under its `actual-state` key. Field names are
//! the camelCase names of the worker wire format; unknown fields are
//! ignored so worker and controller can roll independently.

use super::{HealthState, NodeRole, ShardState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Memory usage above this percentage marks a node resource-unhealthy
pub const MEMORY_USED_THRESHOLD_PERCENT: u32 = 90;
/// Available disk below this many MB marks a node resource-unhealthy
pub const DISK_AVAILABLE_THRESHOLD_MB: u64 = 1024;

/// The heartbeat a worker publishes: identity, resource metrics, and the
/// shard routing table it currently serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchUnitActualState {
    #[serde(rename = "nodeName")]
    pub node_name: String,
    pub address: String,
    #[serde(rename = "httpPort")]
    pub http_port: u16,
    #[serde(rename = "transportPort")]
    pub transport_port: u16,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "ephemeralId")]
    pub ephemeral_id: String,

    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: u64,
    #[serde(rename = "memoryMaxMB")]
    pub memory_max_mb: u64,
    #[serde(rename = "memoryUsedPercent")]
    pub memory_used_percent: u32,
    #[serde(rename = "heapUsedMB")]
    pub heap_used_mb: u64,
    #[serde(rename = "heapMaxMB")]
    pub heap_max_mb: u64,
    #[serde(rename = "heapUsedPercent")]
    pub heap_used_percent: u32,
    #[serde(rename = "diskTotalMB")]
    pub disk_total_mb: u64,
    #[serde(rename = "diskAvailableMB")]
    pub disk_available_mb: u64,
    #[serde(rename = "cpuUsedPercent")]
    pub cpu_used_percent: u32,

    #[serde(rename = "heartbeatIntervalMillis")]
    pub heartbeat_interval_millis: u64,
    /// Wall-clock millis at publish time, worker's clock
    pub timestamp: i64,

    /// index name -> routing entries for every shard copy on this node
    #[serde(rename = "nodeRouting")]
    pub node_routing: BTreeMap<String, Vec<ShardRouting>>,

    #[serde(rename = "clusterlessRole")]
    pub role: Option<NodeRole>,
    #[serde(rename = "clusterlessShardId")]
    pub shard_pool_id: Option<String>,
    pub cluster_name: String,

    /// Opaque dataplane stats blob (doc counts, checkpoints); passed through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

impl SearchUnitActualState {
    /// Resource health check: memory and disk within operating bounds
    pub fn is_resource_healthy(&self) -> bool {
        self.memory_used_percent < MEMORY_USED_THRESHOLD_PERCENT
            && self.disk_available_mb > DISK_AVAILABLE_THRESHOLD_MB
    }

    /// Health is a pure function of the heartbeat: RED when resources are
    /// exhausted, GREEN when serving at least one STARTED shard, YELLOW when
    /// healthy but idle. A node reporting no routing at all (coordinators)
    /// counts as GREEN.
    pub fn derive_health(&self) -> HealthState {
        if !self.is_resource_healthy() {
            return HealthState::Red;
        }
        if self.node_routing.is_empty() {
            return HealthState::Green;
        }
        let has_started = self
            .node_routing
            .values()
            .flatten()
            .any(|routing| routing.state == ShardState::Started);
        if has_started {
            HealthState::Green
        } else {
            HealthState::Yellow
        }
    }

    /// Resource-unhealthy nodes are drained so the allocator routes around them
    pub fn derive_admin_state(&self) -> super::AdminState {
        if self.is_resource_healthy() {
            super::AdminState::Normal
        } else {
            super::AdminState::Drain
        }
    }
}

/// One shard copy in a heartbeat's routing table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardRouting {
    #[serde(rename = "shardId")]
    pub shard_id: u32,
    /// "primary" or "search_replica" in the worker wire format
    pub role: String,
    pub state: ShardState,
    pub relocating: bool,
    #[serde(rename = "relocatingNodeId")]
    pub relocating_node_id: Option<String>,
    #[serde(rename = "allocationId")]
    pub allocation_id: Option<String>,
    #[serde(rename = "currentNodeId")]
    pub current_node_id: Option<String>,
    #[serde(rename = "currentNodeName")]
    pub current_node_name: Option<String>,
}

impl Default for ShardRouting {
    fn default() -> Self {
        Self {
            shard_id: 0,
            role: String::new(),
            state: ShardState::Unassigned,
            relocating: false,
            relocating_node_id: None,
            allocation_id: None,
            current_node_id: None,
            current_node_name: None,
        }
    }
}

impl ShardRouting {
    pub fn new(shard_id: u32, role: &str, state: ShardState) -> Self {
        Self {
            shard_id,
            role: role.to_string(),
            state,
            ..Default::default()
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role.eq_ignore_ascii_case("primary")
    }
}
