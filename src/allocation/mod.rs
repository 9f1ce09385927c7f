//! Shard allocation: decision engines, the planning loop, and the observed
//! placement updater.

mod actual;
mod allocator;
mod engine;

pub use actual::ActualAllocationUpdater;
pub use allocator::ShardAllocator;
pub use engine::{
    AllocationDecisionEngine, GroupAwareBinPackingEngine, Selection, ShardContext,
    StandardAllocationEngine,
};

use serde::{Deserialize, Serialize};

/// Which decision engine plans reader placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    /// Bound each shard's readers by its configured replica count
    RespectReplicaCount,
    /// Saturate whole replica groups, bounded by the configured group count
    UseAllAvailableNodes,
}

impl std::str::FromStr for AllocationStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESPECT_REPLICA_COUNT" => Ok(Self::RespectReplicaCount),
            "USE_ALL_AVAILABLE_NODES" => Ok(Self::UseAllAvailableNodes),
            other => Err(crate::Error::InvalidRequest(format!(
                "unknown allocation strategy '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_wire_labels() {
        assert_eq!(
            "RESPECT_REPLICA_COUNT".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::RespectReplicaCount
        );
        assert_eq!(
            "USE_ALL_AVAILABLE_NODES".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::UseAllAvailableNodes
        );
        assert!("ROUND_ROBIN".parse::<AllocationStrategy>().is_err());
    }
}
