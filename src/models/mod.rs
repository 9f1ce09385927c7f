//! Cluster metadata documents and shared enums
//!
//! Every type here round-trips through the metadata store as UTF-8 JSON.
//! Control documents (unit conf, goal state, allocations) use snake_case
//! fields; the worker heartbeat keeps the camelCase names workers publish.

mod actual_state;
mod allocation;
mod goal_state;
mod index;
mod task;

pub use actual_state::{SearchUnitActualState, ShardRouting};
pub use allocation::ShardAllocation;
pub use goal_state::SearchUnitGoalState;
pub use index::{IndexConfig, IndexSettings};
pub use task::TaskMetadata;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed health of a node or shard.
///
/// Variant order matters: `Red < Yellow < Green`, so the worst status of a
/// set is its minimum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Red,
    Yellow,
    Green,
}

/// Logical role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    /// Request router; hosts no shard data
    Coordinator,
    /// Sole writer for a shard pool
    Primary,
    /// Read-only replica in a replica group
    SearchReplica,
}

/// Operator-facing admin state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminState {
    Normal,
    Drain,
}

/// Lifecycle state of a shard copy as reported by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardState {
    Started,
    Initializing,
    Relocating,
    Unassigned,
}

/// A node under control-plane management (the `conf` record).
///
/// Synthesised by discovery from heartbeats; never written by workers.
/// Equality covers every field, which is what "update only if something
/// observable changed" compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchUnit {
    /// Stable node name; doubles as the document id
    pub name: String,
    pub host: String,
    pub port_http: u16,
    pub port_transport: u16,
    pub cluster_name: String,
    pub role: NodeRole,
    /// Pool this node offers capacity to: the shard id for a primary, a
    /// replica-group label for a search replica
    pub shard_pool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub state_admin: AdminState,
    /// Health derived from the node's last heartbeat
    pub state_pulled: HealthState,
    #[serde(default)]
    pub node_attributes: BTreeMap<String, String>,
}

impl SearchUnit {
    /// Eligible to receive new shard assignments
    pub fn is_allocatable(&self) -> bool {
        self.state_pulled == HealthState::Green && self.state_admin == AdminState::Normal
    }
}
