//! Metadata store key layout
//!
//! The hierarchy below is the external contract with worker nodes; workers
//! watch these exact keys. Paths are pure functions of their inputs. The
//! only state is the runtime environment label, which prefixes the
//! multi-cluster control paths and is consulted on every call, so switching
//! it mid-flight produces at most one cycle of mixed output.

use parking_lot::RwLock;

/// Default runtime environment for multi-cluster paths
pub const DEFAULT_RUNTIME_ENV: &str = "staging";

/// Resolves entity coordinates to metadata-store keys.
#[derive(Debug)]
pub struct PathResolver {
    runtime_env: RwLock<String>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_ENV)
    }
}

impl PathResolver {
    pub fn new(runtime_env: &str) -> Self {
        let env = runtime_env.trim();
        let env = if env.is_empty() { DEFAULT_RUNTIME_ENV } else { env };
        Self {
            runtime_env: RwLock::new(env.to_string()),
        }
    }

    pub fn runtime_env(&self) -> String {
        self.runtime_env.read().clone()
    }

    /// Change the runtime environment. Empty or whitespace-only values are
    /// ignored and the previous value is retained.
    pub fn set_runtime_env(&self, env: &str) {
        let env = env.trim();
        if env.is_empty() {
            return;
        }
        *self.runtime_env.write() = env.to_string();
    }

    // ---- per-cluster paths ----

    pub fn cluster_root(&self, cluster: &str) -> String {
        format!("/{cluster}")
    }

    pub fn controller_tasks_prefix(&self, cluster: &str) -> String {
        format!("/{cluster}/ctl-tasks")
    }

    pub fn controller_task_path(&self, cluster: &str, task_name: &str) -> String {
        format!("/{cluster}/ctl-tasks/{task_name}")
    }

    pub fn search_units_prefix(&self, cluster: &str) -> String {
        format!("/{cluster}/search-unit")
    }

    pub fn search_unit_conf_path(&self, cluster: &str, unit: &str) -> String {
        format!("/{cluster}/search-unit/{unit}/conf")
    }

    pub fn search_unit_goal_state_path(&self, cluster: &str, unit: &str) -> String {
        format!("/{cluster}/search-unit/{unit}/goal-state")
    }

    pub fn search_unit_actual_state_path(&self, cluster: &str, unit: &str) -> String {
        format!("/{cluster}/search-unit/{unit}/actual-state")
    }

    pub fn indices_prefix(&self, cluster: &str) -> String {
        format!("/{cluster}/indices")
    }

    pub fn index_prefix(&self, cluster: &str, index: &str) -> String {
        format!("/{cluster}/indices/{index}")
    }

    pub fn index_conf_path(&self, cluster: &str, index: &str) -> String {
        format!("/{cluster}/indices/{index}/conf")
    }

    pub fn index_mappings_path(&self, cluster: &str, index: &str) -> String {
        format!("/{cluster}/indices/{index}/mappings")
    }

    pub fn index_settings_path(&self, cluster: &str, index: &str) -> String {
        format!("/{cluster}/indices/{index}/settings")
    }

    pub fn shard_planned_allocation_path(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> String {
        format!("/{cluster}/indices/{index}/{shard_id}/planned-allocation")
    }

    pub fn shard_actual_allocation_path(
        &self,
        cluster: &str,
        index: &str,
        shard_id: &str,
    ) -> String {
        format!("/{cluster}/indices/{index}/{shard_id}/actual-allocation")
    }

    pub fn coordinators_prefix(&self, cluster: &str) -> String {
        format!("/{cluster}/coordinators")
    }

    pub fn coordinator_goal_state_path(&self, cluster: &str, coordinator: &str) -> String {
        format!("/{cluster}/coordinators/{coordinator}/goal-state")
    }

    pub fn coordinator_actual_state_path(&self, cluster: &str, coordinator: &str) -> String {
        format!("/{cluster}/coordinators/{coordinator}/actual-state")
    }

    pub fn leader_election_path(&self, cluster: &str) -> String {
        format!("/{cluster}/leader-election")
    }

    // ---- multi-cluster control paths (environment-prefixed) ----

    pub fn multi_cluster_root(&self) -> String {
        format!("/multi-cluster/{}", self.runtime_env())
    }

    pub fn controllers_prefix(&self) -> String {
        format!("{}/controllers", self.multi_cluster_root())
    }

    pub fn controller_heartbeat_path(&self, controller: &str) -> String {
        format!("{}/controllers/{controller}/heartbeat", self.multi_cluster_root())
    }

    pub fn controller_assignment_path(&self, controller: &str, cluster: &str) -> String {
        format!(
            "{}/controllers/{controller}/assigned/{cluster}",
            self.multi_cluster_root()
        )
    }

    pub fn clusters_prefix(&self) -> String {
        format!("{}/clusters", self.multi_cluster_root())
    }

    pub fn cluster_registry_path(&self, cluster: &str) -> String {
        format!("{}/clusters/{cluster}/metadata", self.multi_cluster_root())
    }

    pub fn cluster_assigned_controller_path(&self, cluster: &str) -> String {
        format!("{}/clusters/{cluster}/assigned-to", self.multi_cluster_root())
    }

    pub fn cluster_lock_path(&self, cluster: &str) -> String {
        format!("{}/locks/clusters/{cluster}", self.multi_cluster_root())
    }
}
