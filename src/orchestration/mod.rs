//! Goal-state orchestration
//!
//! Inverts the per-shard planned allocations into per-node goal documents.
//! A node's goal state only changes when its allocation does, and writes go
//! out under a rolling-update discipline so the worker fleet never sees a
//! thundering herd of reassignments in one cycle.

use crate::models::{NodeRole, SearchUnitGoalState};
use crate::store::MetadataStore;
use crate::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default bound on concurrent goal-state writes
pub const DEFAULT_WRITE_CONCURRENCY: usize = 4;

/// A pending goal-state write for one node.
#[derive(Debug, Clone)]
pub struct GoalTransition {
    pub unit_name: String,
    /// Node's role, used to bucket transitions for the rolling policy
    pub role: Option<NodeRole>,
    pub next: SearchUnitGoalState,
}

/// Decides which of a cycle's pending transitions are applied now.
/// Whatever is not admitted is recomputed and retried next cycle.
pub trait OrchestrationStrategy: Send + Sync {
    fn admit(&self, transitions: Vec<GoalTransition>) -> Vec<GoalTransition>;
}

/// Applies every pending transition immediately.
#[derive(Debug, Default)]
pub struct ImmediateStrategy;

impl OrchestrationStrategy for ImmediateStrategy {
    fn admit(&self, transitions: Vec<GoalTransition>) -> Vec<GoalTransition> {
        transitions
    }
}

/// Admits at most `max_per_role` transitions per node-role bucket per cycle.
#[derive(Debug)]
pub struct RollingUpdateStrategy {
    pub max_per_role: usize,
}

impl Default for RollingUpdateStrategy {
    fn default() -> Self {
        Self { max_per_role: 2 }
    }
}

impl OrchestrationStrategy for RollingUpdateStrategy {
    fn admit(&self, mut transitions: Vec<GoalTransition>) -> Vec<GoalTransition> {
        transitions.sort_by(|a, b| a.unit_name.cmp(&b.unit_name));
        let mut admitted = Vec::new();
        let mut in_flight: HashMap<Option<NodeRole>, usize> = HashMap::new();
        for transition in transitions {
            let count = in_flight.entry(transition.role).or_insert(0);
            if *count < self.max_per_role {
                *count += 1;
                admitted.push(transition);
            }
        }
        admitted
    }
}

pub struct GoalStateOrchestrator {
    store: Arc<dyn MetadataStore>,
    strategy: Box<dyn OrchestrationStrategy>,
    write_concurrency: usize,
}

impl GoalStateOrchestrator {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self::with_strategy(store, Box::new(RollingUpdateStrategy::default()))
    }

    pub fn with_strategy(
        store: Arc<dyn MetadataStore>,
        strategy: Box<dyn OrchestrationStrategy>,
    ) -> Self {
        Self {
            store,
            strategy,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
        }
    }

    /// One orchestration pass: recompute every node's goal from the planned
    /// allocations and write the ones that changed.
    pub async fn orchestrate_goal_states(&self, cluster: &str) -> Result<()> {
        let indices = self.store.get_all_index_configs(cluster).await?;

        // Invert shard -> nodes into node -> shards
        let mut desired: BTreeMap<String, SearchUnitGoalState> = BTreeMap::new();
        for index in &indices {
            let allocations = self
                .store
                .get_all_planned_allocations(cluster, &index.index_name)
                .await?;
            for allocation in allocations {
                for writer in &allocation.ingest_sus {
                    desired.entry(writer.clone()).or_default().assign(
                        &allocation.index_name,
                        &allocation.shard_id,
                        NodeRole::Primary,
                    );
                }
                for reader in &allocation.search_sus {
                    desired.entry(reader.clone()).or_default().assign(
                        &allocation.index_name,
                        &allocation.shard_id,
                        NodeRole::SearchReplica,
                    );
                }
            }
        }

        let units = self.store.get_all_search_units(cluster).await?;
        let roles: HashMap<String, NodeRole> = units
            .iter()
            .map(|unit| (unit.name.clone(), unit.role))
            .collect();

        // Every node we know about, whether or not it holds an allocation;
        // nodes that lost all shards converge to an empty goal state.
        let mut names: BTreeSet<String> = units.into_iter().map(|unit| unit.name).collect();
        names.extend(desired.keys().cloned());

        let mut transitions = Vec::new();
        for name in names {
            let prev = match self.store.get_goal_state(cluster, &name).await {
                Ok(prev) => prev,
                Err(e) => {
                    warn!(unit = %name, error = %e, "Could not load goal state, retrying next cycle");
                    continue;
                }
            };
            let mut next = desired.get(&name).cloned().unwrap_or_default();

            // Absent is equivalent to empty: never write an empty goal for a
            // node that has none stored
            match &prev {
                None if next.is_empty() => continue,
                Some(prev) if *prev == next => continue,
                _ => {}
            }

            next.version = prev.as_ref().map(|p| p.version + 1).unwrap_or(1);
            next.last_updated = Some(Utc::now());
            let role = roles.get(&name).copied();
            transitions.push(GoalTransition {
                unit_name: name,
                role,
                next,
            });
        }

        let pending = transitions.len();
        let admitted = self.strategy.admit(transitions);
        if admitted.len() < pending {
            info!(
                cluster,
                admitted = admitted.len(),
                deferred = pending - admitted.len(),
                "Rolling update deferred some goal-state transitions"
            );
        }

        let results: Vec<(String, Result<()>)> = stream::iter(admitted.into_iter().map(
            |transition| {
                let store = Arc::clone(&self.store);
                let cluster = cluster.to_string();
                async move {
                    let result = store
                        .update_goal_state(&cluster, &transition.unit_name, &transition.next)
                        .await;
                    (transition.unit_name, result)
                }
            },
        ))
        .buffer_unordered(self.write_concurrency)
        .collect()
        .await;

        let mut written = 0usize;
        for (unit_name, result) in results {
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(unit = %unit_name, error = %e, "Goal-state write failed, retrying next cycle")
                }
            }
        }

        debug!(cluster, written, "Goal-state orchestration pass complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(name: &str, role: Option<NodeRole>) -> GoalTransition {
        GoalTransition {
            unit_name: name.to_string(),
            role,
            next: SearchUnitGoalState::default(),
        }
    }

    #[test]
    fn rolling_update_caps_each_role_bucket() {
        let strategy = RollingUpdateStrategy { max_per_role: 2 };
        let admitted = strategy.admit(vec![
            transition("r3", Some(NodeRole::SearchReplica)),
            transition("r1", Some(NodeRole::SearchReplica)),
            transition("r2", Some(NodeRole::SearchReplica)),
            transition("p1", Some(NodeRole::Primary)),
        ]);
        let names: Vec<_> = admitted.iter().map(|t| t.unit_name.as_str()).collect();
        // Two lexically-first replicas plus the primary bucket
        assert_eq!(names, vec!["p1", "r1", "r2"]);
    }

    #[test]
    fn rolling_update_buckets_unknown_roles_together() {
        let strategy = RollingUpdateStrategy { max_per_role: 1 };
        let admitted = strategy.admit(vec![transition("a", None), transition("b", None)]);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].unit_name, "a");
    }

    #[test]
    fn immediate_strategy_admits_everything() {
        let admitted = ImmediateStrategy.admit(vec![
            transition("a", None),
            transition("b", Some(NodeRole::Primary)),
        ]);
        assert_eq!(admitted.len(), 2);
    }
}
