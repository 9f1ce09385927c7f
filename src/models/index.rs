//! Index catalogue records

use serde::{Deserialize, Serialize};

/// Per-index settings the control plane consumes.
///
/// The length of `shard_replica_count` is the shard count; entry `i` caps the
/// replicas of shard `i` under the replica-count strategy. The optional
/// `shard_groups_allocate_count` gives the desired replica-group count per
/// shard for the bin-packing strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub number_of_shards: u32,
    #[serde(default)]
    pub shard_replica_count: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_groups_allocate_count: Option<Vec<u32>>,
}

/// Index catalogue record (the `conf` document under `indices/<name>`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub index_name: String,
    #[serde(default)]
    pub settings: IndexSettings,
}

impl IndexConfig {
    pub fn new(index_name: &str, shard_replica_count: Vec<u32>) -> Self {
        Self {
            index_name: index_name.to_string(),
            settings: IndexSettings {
                number_of_shards: shard_replica_count.len() as u32,
                shard_replica_count,
                shard_groups_allocate_count: None,
            },
        }
    }

    /// Number of shards, defined by the replica-count list
    pub fn shard_count(&self) -> usize {
        self.settings.shard_replica_count.len()
    }

    /// Replica cap for shard `i` (replica-count strategy)
    pub fn replica_count(&self, shard: usize) -> u32 {
        self.settings
            .shard_replica_count
            .get(shard)
            .copied()
            .unwrap_or(0)
    }

    /// Desired replica-group count for shard `i` (bin-packing strategy).
    /// Absent configuration means a single group.
    pub fn group_count(&self, shard: usize) -> u32 {
        self.settings
            .shard_groups_allocate_count
            .as_ref()
            .and_then(|counts| counts.get(shard).copied())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_count_follows_replica_list() {
        let index = IndexConfig::new("logs", vec![2, 1, 3]);
        assert_eq!(index.shard_count(), 3);
        assert_eq!(index.replica_count(0), 2);
        assert_eq!(index.replica_count(2), 3);
        assert_eq!(index.replica_count(9), 0);
    }

    #[test]
    fn group_count_defaults_to_one() {
        let mut index = IndexConfig::new("logs", vec![1, 1]);
        assert_eq!(index.group_count(0), 1);

        index.settings.shard_groups_allocate_count = Some(vec![2, 3]);
        assert_eq!(index.group_count(0), 2);
        assert_eq!(index.group_count(1), 3);
        assert_eq!(index.group_count(5), 1);
    }
}
