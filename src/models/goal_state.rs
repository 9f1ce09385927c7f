//! Per-node goal state
//!
//! The document a worker pulls to learn which shards it should host.

use super::NodeRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Goal state for one search unit: index name -> shard id -> role.
///
/// Equality is defined over `local_shards` only. `last_updated` and
/// `version` are write metadata; comparing them would defeat the
/// write-suppression that keeps workers from thrashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchUnitGoalState {
    #[serde(default)]
    pub local_shards: BTreeMap<String, BTreeMap<String, NodeRole>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default = "initial_version")]
    pub version: u64,
}

fn initial_version() -> u64 {
    1
}

impl Default for SearchUnitGoalState {
    fn default() -> Self {
        Self {
            local_shards: BTreeMap::new(),
            last_updated: None,
            version: 1,
        }
    }
}

impl PartialEq for SearchUnitGoalState {
    fn eq(&self, other: &Self) -> bool {
        self.local_shards == other.local_shards
    }
}

impl Eq for SearchUnitGoalState {}

impl SearchUnitGoalState {
    pub fn has_index(&self, index_name: &str) -> bool {
        self.local_shards.contains_key(index_name)
    }

    /// Shard ids this node should host for an index
    pub fn shards_for_index(&self, index_name: &str) -> Vec<String> {
        self.local_shards
            .get(index_name)
            .map(|shards| shards.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn shard_role(&self, index_name: &str, shard_id: &str) -> Option<NodeRole> {
        self.local_shards
            .get(index_name)
            .and_then(|shards| shards.get(shard_id))
            .copied()
    }

    pub fn assign(&mut self, index_name: &str, shard_id: &str, role: NodeRole) {
        self.local_shards
            .entry(index_name.to_string())
            .or_default()
            .insert(shard_id.to_string(), role);
    }

    /// True when no shard is assigned at all
    pub fn is_empty(&self) -> bool {
        self.local_shards.values().all(|shards| shards.is_empty())
    }
}
