//! Allocation decision engines
//!
//! Both engines answer the same question: given a shard, the candidate pool,
//! and the current plan, which nodes serve it next? Answers are
//! deterministic for equal inputs and stable across sessions: existing
//! placement is retained wherever the caps allow, and every tie-break is
//! lexical.

use crate::models::{IndexConfig, NodeRole, SearchUnit, ShardAllocation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// The shard a selection is being made for.
pub struct ShardContext<'a> {
    pub index: &'a IndexConfig,
    pub shard: usize,
}

impl ShardContext<'_> {
    pub fn shard_id(&self) -> String {
        self.shard.to_string()
    }
}

/// Outcome of a selection: at most one writer plus the reader set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub writer: Option<String>,
    pub readers: Vec<String>,
}

/// Capability shared by all allocation strategies.
pub trait AllocationDecisionEngine: Send + Sync {
    fn select(
        &self,
        ctx: &ShardContext<'_>,
        candidates: &[SearchUnit],
        current: Option<&ShardAllocation>,
    ) -> Selection;
}

/// Picks the single writer for a shard: exactly one allocatable PRIMARY
/// whose pool id matches the shard id. Zero or multiple eligible primaries
/// leave the writer empty; reader selection is unaffected.
fn select_writer(ctx: &ShardContext<'_>, candidates: &[SearchUnit]) -> Option<String> {
    let shard_id = ctx.shard_id();
    let mut eligible: Vec<&SearchUnit> = candidates
        .iter()
        .filter(|unit| {
            unit.role == NodeRole::Primary
                && unit.shard_pool_id == shard_id
                && unit.is_allocatable()
        })
        .collect();
    eligible.sort_by(|a, b| a.name.cmp(&b.name));

    match eligible.as_slice() {
        [only] => Some(only.name.clone()),
        [] => {
            warn!(
                index = %ctx.index.index_name,
                shard = %shard_id,
                "No eligible writer for shard pool, leaving ingest empty"
            );
            None
        }
        many => {
            warn!(
                index = %ctx.index.index_name,
                shard = %shard_id,
                writers = many.len(),
                "Multiple primaries declare the same shard pool, leaving ingest empty"
            );
            None
        }
    }
}

/// Replica-count-bounded engine (`RESPECT_REPLICA_COUNT`).
///
/// Readers come from the pool whose label equals the shard id. Currently
/// planned readers that are still allocatable are kept; the remainder of the
/// cap is filled with the lexically first unused candidates.
#[derive(Debug, Default)]
pub struct StandardAllocationEngine;

impl AllocationDecisionEngine for StandardAllocationEngine {
    fn select(
        &self,
        ctx: &ShardContext<'_>,
        candidates: &[SearchUnit],
        current: Option<&ShardAllocation>,
    ) -> Selection {
        let shard_id = ctx.shard_id();
        let cap = ctx.index.replica_count(ctx.shard) as usize;

        let pool: BTreeSet<&str> = candidates
            .iter()
            .filter(|unit| {
                unit.role == NodeRole::SearchReplica
                    && unit.shard_pool_id == shard_id
                    && unit.is_allocatable()
            })
            .map(|unit| unit.name.as_str())
            .collect();

        // Stability first: keep planned readers that are still usable
        let mut readers: Vec<String> = current
            .map(|alloc| {
                alloc
                    .search_sus
                    .iter()
                    .filter(|name| pool.contains(name.as_str()))
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();

        if readers.len() >= cap {
            readers.truncate(cap);
        } else {
            let kept: BTreeSet<&str> = readers.iter().map(String::as_str).collect();
            let extra = pool
                .iter()
                .filter(|name| !kept.contains(**name))
                .take(cap - readers.len())
                .map(|name| name.to_string())
                .collect::<Vec<_>>();
            readers.extend(extra);
            readers.sort();
        }

        debug!(
            index = %ctx.index.index_name,
            shard = %shard_id,
            cap,
            selected = readers.len(),
            "Standard engine selected readers"
        );

        Selection {
            writer: select_writer(ctx, candidates),
            readers,
        }
    }
}

/// Group-aware bin-packing engine (`USE_ALL_AVAILABLE_NODES`).
///
/// The unit of allocation is a replica group, identified by the pool label
/// on reader nodes. The configured group count bounds how many groups serve
/// the shard; replica-count caps are ignored, and every allocatable member
/// of a selected group is used. Planned groups are kept while the count
/// matches; scale-up adds lexically first new groups, scale-down keeps the
/// groups with the most healthy members.
#[derive(Debug, Default)]
pub struct GroupAwareBinPackingEngine;

impl AllocationDecisionEngine for GroupAwareBinPackingEngine {
    fn select(
        &self,
        ctx: &ShardContext<'_>,
        candidates: &[SearchUnit],
        current: Option<&ShardAllocation>,
    ) -> Selection {
        let target = ctx.index.group_count(ctx.shard) as usize;

        // group label -> allocatable members
        let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for unit in candidates {
            if unit.role == NodeRole::SearchReplica && unit.is_allocatable() {
                groups
                    .entry(unit.shard_pool_id.as_str())
                    .or_default()
                    .insert(unit.name.as_str());
            }
        }

        let planned_names: BTreeSet<&str> = current
            .map(|alloc| alloc.search_sus.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut selected: BTreeSet<&str> = groups
            .iter()
            .filter(|(_, members)| members.iter().any(|name| planned_names.contains(*name)))
            .map(|(label, _)| *label)
            .collect();

        if selected.len() < target {
            // Scale up: lexically first groups not already selected
            let additions: Vec<&str> = groups
                .keys()
                .filter(|label| !selected.contains(**label))
                .take(target - selected.len())
                .copied()
                .collect();
            for label in additions {
                selected.insert(label);
            }
        } else if selected.len() > target {
            // Scale down: keep the groups with the most healthy members
            let mut ranked: Vec<&str> = selected.iter().copied().collect();
            ranked.sort_by_key(|label| {
                (std::cmp::Reverse(groups.get(label).map_or(0, BTreeSet::len)), *label)
            });
            selected = ranked.into_iter().take(target).collect();
        }

        // Whole-group rule: every allocatable member of a selected group serves
        let readers: Vec<String> = selected
            .iter()
            .flat_map(|label| groups.get(label).into_iter().flatten())
            .map(|name| name.to_string())
            .collect();

        debug!(
            index = %ctx.index.index_name,
            shard = ctx.shard,
            target_groups = target,
            selected_groups = selected.len(),
            readers = readers.len(),
            "Bin-packing engine selected groups"
        );

        Selection {
            writer: select_writer(ctx, candidates),
            readers,
        }
    }
}
