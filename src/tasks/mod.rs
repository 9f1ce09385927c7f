//! Controller task scheduling
//!
//! A cooperative loop that drives the reconciliation pipeline while this
//! process holds leadership. Task records live in the store under
//! `ctl-tasks/` and execute in ascending priority order; leadership is
//! re-checked between tasks so a pass stops writing the moment the lease is
//! lost. Ticks that arrive while a pass is still running are dropped.

use crate::allocation::{ActualAllocationUpdater, AllocationStrategy, ShardAllocator};
use crate::discovery::Discovery;
use crate::indices::IndexManager;
use crate::models::TaskMetadata;
use crate::orchestration::GoalStateOrchestrator;
use crate::store::MetadataStore;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ACTION_DISCOVER: &str = "discover-search-units";
pub const ACTION_PLAN_ALLOCATION: &str = "plan-shard-allocation";
pub const ACTION_ORCHESTRATE: &str = "orchestrate-goal-states";
pub const ACTION_UPDATE_ACTUAL: &str = "update-actual-allocations";
pub const ACTION_EVICT_STALE: &str = "evict-stale-units";

/// Dependencies the task handlers run against.
pub struct TaskContext {
    pub cluster: String,
    pub strategy: AllocationStrategy,
    pub discovery: Discovery,
    pub allocator: ShardAllocator,
    pub orchestrator: GoalStateOrchestrator,
    pub actual_updater: ActualAllocationUpdater,
    pub index_manager: IndexManager,
}

impl TaskContext {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        cluster: &str,
        strategy: AllocationStrategy,
        stale_grace: Duration,
    ) -> Self {
        Self {
            cluster: cluster.to_string(),
            strategy,
            discovery: Discovery::with_stale_grace(Arc::clone(&store), cluster, stale_grace),
            allocator: ShardAllocator::new(Arc::clone(&store)),
            orchestrator: GoalStateOrchestrator::new(Arc::clone(&store)),
            actual_updater: ActualAllocationUpdater::new(Arc::clone(&store)),
            index_manager: IndexManager::new(store),
        }
    }
}

pub struct TaskManager {
    store: Arc<dyn MetadataStore>,
    ctx: TaskContext,
    interval: Duration,
    /// Task names currently executing; a second invocation of the same task
    /// is dropped rather than queued
    in_flight: DashMap<String, ()>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn MetadataStore>, ctx: TaskContext, interval: Duration) -> Self {
        Self {
            store,
            ctx,
            interval,
            in_flight: DashMap::new(),
        }
    }

    /// The standard pipeline tasks, in execution order.
    fn default_tasks() -> Vec<TaskMetadata> {
        vec![
            TaskMetadata::new(ACTION_DISCOVER, 10, ACTION_DISCOVER),
            TaskMetadata::new(ACTION_PLAN_ALLOCATION, 20, ACTION_PLAN_ALLOCATION),
            TaskMetadata::new(ACTION_ORCHESTRATE, 30, ACTION_ORCHESTRATE),
            TaskMetadata::new(ACTION_UPDATE_ACTUAL, 40, ACTION_UPDATE_ACTUAL),
            TaskMetadata::new(ACTION_EVICT_STALE, 50, ACTION_EVICT_STALE),
        ]
    }

    /// Create any default task record that does not exist yet. Existing
    /// records are left alone so operators can re-prioritise them.
    pub async fn seed_default_tasks(&self) -> Result<()> {
        for task in Self::default_tasks() {
            if self.store.get_task(&self.ctx.cluster, &task.name).await?.is_none() {
                self.store.create_task(&self.ctx.cluster, &task).await?;
                debug!(task = %task.name, priority = task.priority, "Seeded controller task");
            }
        }
        Ok(())
    }

    /// Run the scheduler until the process exits. Ticks while a pass is in
    /// progress are skipped, not queued.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(
            cluster = %self.ctx.cluster,
            interval_secs = self.interval.as_secs(),
            "Starting task scheduler"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_pass().await;
            }
        })
    }

    /// One scheduler pass: execute every task in priority order, stopping as
    /// soon as leadership is gone.
    pub async fn run_pass(&self) {
        if !self.store.is_leader(&self.ctx.cluster) {
            debug!(cluster = %self.ctx.cluster, "Not the leader, skipping pass");
            return;
        }

        let tasks = match self.store.get_all_tasks(&self.ctx.cluster).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(cluster = %self.ctx.cluster, error = %e, "Failed to load tasks, skipping pass");
                return;
            }
        };

        for task in tasks {
            if !self.store.is_leader(&self.ctx.cluster) {
                warn!(cluster = %self.ctx.cluster, "Leadership lost mid-pass, aborting remaining tasks");
                return;
            }
            self.execute_task(&task).await;
        }
    }

    async fn execute_task(&self, task: &TaskMetadata) {
        if self.in_flight.insert(task.name.clone(), ()).is_some() {
            debug!(task = %task.name, "Previous run still in progress, dropping");
            return;
        }

        let result = self.dispatch(task).await;
        self.in_flight.remove(&task.name);

        if let Err(e) = result {
            // Transient errors retry naturally on the next cycle
            warn!(task = %task.name, error = %e, "Task failed");
        }
    }

    async fn dispatch(&self, task: &TaskMetadata) -> Result<()> {
        debug!(task = %task.name, action = %task.action, "Executing task");
        match task.action.as_str() {
            ACTION_DISCOVER => self.ctx.discovery.discover_search_units().await,
            ACTION_PLAN_ALLOCATION => {
                self.ctx
                    .allocator
                    .plan_shard_allocation(&self.ctx.cluster, self.ctx.strategy)
                    .await
            }
            ACTION_ORCHESTRATE => {
                self.ctx
                    .orchestrator
                    .orchestrate_goal_states(&self.ctx.cluster)
                    .await
            }
            ACTION_UPDATE_ACTUAL => {
                self.ctx
                    .actual_updater
                    .update_actual_allocations(&self.ctx.cluster)
                    .await
            }
            ACTION_EVICT_STALE => self.ctx.discovery.evict_stale_units().await,
            other => {
                debug!(task = %task.name, action = %other, "Unknown task action, skipping");
                Ok(())
            }
        }
    }
}
