//! Node discovery from worker heartbeats
//!
//! Materialises the roster: every heartbeat under the search-units prefix is
//! projected into a `conf` record, and units whose heartbeats stopped are
//! evicted after a grace period. The whole pass is best-effort; a failed
//! read logs and leaves the store untouched, a single bad heartbeat is
//! skipped.

use crate::models::{NodeRole, SearchUnit, SearchUnitActualState};
use crate::store::MetadataStore;
use crate::Result;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default heartbeat absence tolerated before a unit is evicted
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(60);

pub struct Discovery {
    store: Arc<dyn MetadataStore>,
    cluster: String,
    stale_grace: Duration,
    /// When each unit's heartbeat was last observed by this process
    last_seen: DashMap<String, Instant>,
}

impl Discovery {
    pub fn new(store: Arc<dyn MetadataStore>, cluster: &str) -> Self {
        Self::with_stale_grace(store, cluster, DEFAULT_STALE_GRACE)
    }

    pub fn with_stale_grace(
        store: Arc<dyn MetadataStore>,
        cluster: &str,
        stale_grace: Duration,
    ) -> Self {
        Self {
            store,
            cluster: cluster.to_string(),
            stale_grace,
            last_seen: DashMap::new(),
        }
    }

    /// One discovery pass: upsert a conf record per heartbeat.
    pub async fn discover_search_units(&self) -> Result<()> {
        let states = match self.store.get_all_actual_states(&self.cluster).await {
            Ok(states) => states,
            Err(e) => {
                warn!(cluster = %self.cluster, error = %e, "Heartbeat read failed, skipping discovery pass");
                return Ok(());
            }
        };

        let mut created = 0usize;
        let mut updated = 0usize;
        for (unit_name, state) in &states {
            self.last_seen.insert(unit_name.clone(), Instant::now());

            let Some(mut unit) = self.unit_from_actual_state(unit_name, state) else {
                continue;
            };

            let existing = match self.store.get_search_unit(&self.cluster, unit_name).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(unit = %unit_name, error = %e, "Failed to load unit conf, skipping");
                    continue;
                }
            };

            match existing {
                None => {
                    if let Err(e) = self
                        .store
                        .upsert_search_unit(&self.cluster, unit_name, &unit)
                        .await
                    {
                        warn!(unit = %unit_name, error = %e, "Failed to create unit conf");
                        continue;
                    }
                    info!(unit = %unit_name, role = ?unit.role, "Discovered new search unit");
                    created += 1;
                }
                Some(prev) => {
                    // Zone is operator-assigned, not heartbeat-derived; carry it over
                    unit.zone = unit.zone.or(prev.zone.clone());
                    if unit != prev {
                        if let Err(e) = self
                            .store
                            .upsert_search_unit(&self.cluster, unit_name, &unit)
                            .await
                        {
                            warn!(unit = %unit_name, error = %e, "Failed to update unit conf");
                            continue;
                        }
                        debug!(unit = %unit_name, "Updated search unit conf");
                        updated += 1;
                    }
                }
            }
        }

        debug!(
            cluster = %self.cluster,
            heartbeats = states.len(),
            created,
            updated,
            "Discovery pass complete"
        );
        Ok(())
    }

    /// Remove units whose heartbeats have been absent longer than the grace.
    /// Coordinators and drained nodes are eligible on the same rule.
    pub async fn evict_stale_units(&self) -> Result<()> {
        let states = match self.store.get_all_actual_states(&self.cluster).await {
            Ok(states) => states,
            Err(e) => {
                warn!(cluster = %self.cluster, error = %e, "Heartbeat read failed, skipping eviction pass");
                return Ok(());
            }
        };
        let units = match self.store.get_all_search_units(&self.cluster).await {
            Ok(units) => units,
            Err(e) => {
                warn!(cluster = %self.cluster, error = %e, "Roster read failed, skipping eviction pass");
                return Ok(());
            }
        };

        for unit in units {
            if states.contains_key(&unit.name) {
                continue;
            }
            // First time we notice the absence, start the grace clock
            let absent_since = *self
                .last_seen
                .entry(unit.name.clone())
                .or_insert_with(Instant::now);
            if absent_since.elapsed() <= self.stale_grace {
                continue;
            }
            match self.store.delete_search_unit(&self.cluster, &unit.name).await {
                Ok(()) => {
                    info!(unit = %unit.name, "Evicted stale search unit");
                    self.last_seen.remove(&unit.name);
                }
                Err(e) => warn!(unit = %unit.name, error = %e, "Failed to evict stale unit"),
            }
        }
        Ok(())
    }

    /// Project a heartbeat into a conf record. Heartbeats without a usable
    /// role are treated like parse failures and skipped.
    fn unit_from_actual_state(
        &self,
        unit_name: &str,
        state: &SearchUnitActualState,
    ) -> Option<SearchUnit> {
        let Some(role) = state.role else {
            warn!(unit = %unit_name, "Heartbeat carries no role, skipping");
            return None;
        };

        let shard_pool_id = match (&state.shard_pool_id, role) {
            (Some(pool), _) => pool.clone(),
            (None, NodeRole::Coordinator) => "COORDINATOR".to_string(),
            (None, _) => {
                warn!(unit = %unit_name, "Data node heartbeat carries no shard pool id, skipping");
                return None;
            }
        };

        let cluster_name = if state.cluster_name.is_empty() {
            self.cluster.clone()
        } else {
            state.cluster_name.clone()
        };

        Some(SearchUnit {
            name: unit_name.to_string(),
            host: state.address.clone(),
            port_http: state.http_port,
            port_transport: state.transport_port,
            cluster_name,
            role,
            shard_pool_id,
            zone: None,
            state_admin: state.derive_admin_state(),
            state_pulled: state.derive_health(),
            node_attributes: capability_attributes(role),
        })
    }
}

/// Capability flags a node advertises, derived from its role
fn capability_attributes(role: NodeRole) -> BTreeMap<String, String> {
    let (master, data, ingest) = match role {
        NodeRole::Coordinator => (true, false, false),
        NodeRole::Primary => (false, true, true),
        NodeRole::SearchReplica => (false, true, false),
    };
    let mut attributes = BTreeMap::new();
    attributes.insert("node.master".to_string(), master.to_string());
    attributes.insert("node.data".to_string(), data.to_string());
    attributes.insert("node.ingest".to_string(), ingest.to_string());
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_attributes_per_role() {
        let coordinator = capability_attributes(NodeRole::Coordinator);
        assert_eq!(coordinator["node.master"], "true");
        assert_eq!(coordinator["node.data"], "false");
        assert_eq!(coordinator["node.ingest"], "false");

        let primary = capability_attributes(NodeRole::Primary);
        assert_eq!(primary["node.master"], "false");
        assert_eq!(primary["node.data"], "true");
        assert_eq!(primary["node.ingest"], "true");

        let replica = capability_attributes(NodeRole::SearchReplica);
        assert_eq!(replica["node.data"], "true");
        assert_eq!(replica["node.ingest"], "false");
    }
}
