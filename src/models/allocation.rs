//! Planned and actual shard allocation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allocation of one shard: at most one writer plus a set of readers.
///
/// The same document shape backs both the planned allocation (written by the
/// allocator) and the actual allocation (written from observed heartbeats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardAllocation {
    pub index_name: String,
    pub shard_id: String,
    /// Zero or one writer node names; never more
    #[serde(default)]
    pub ingest_sus: Vec<String>,
    /// Reader node names
    #[serde(default)]
    pub search_sus: Vec<String>,
    pub allocation_timestamp: DateTime<Utc>,
    pub status: String,
}

impl ShardAllocation {
    pub const STATUS_PLANNED: &'static str = "PLANNED";
    /// Writer pool was empty or ambiguous; readers may still be planned
    pub const STATUS_NO_WRITER: &'static str = "NO_WRITER";
    /// Record reflects observed placement, not a decision
    pub const STATUS_OBSERVED: &'static str = "OBSERVED";

    pub fn new(index_name: &str, shard_id: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            shard_id: shard_id.to_string(),
            ingest_sus: Vec::new(),
            search_sus: Vec::new(),
            allocation_timestamp: Utc::now(),
            status: Self::STATUS_PLANNED.to_string(),
        }
    }

    /// Placement equality: same writer set and same reader set, order and
    /// timestamp ignored. Drives write suppression.
    pub fn same_placement(&self, other: &ShardAllocation) -> bool {
        let readers_a: BTreeSet<_> = self.search_sus.iter().collect();
        let readers_b: BTreeSet<_> = other.search_sus.iter().collect();
        let writers_a: BTreeSet<_> = self.ingest_sus.iter().collect();
        let writers_b: BTreeSet<_> = other.ingest_sus.iter().collect();
        writers_a == writers_b && readers_a == readers_b
    }
}
