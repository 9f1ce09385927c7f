//! Controller task records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled controller task stored under `ctl-tasks/<name>`.
///
/// Lower priority runs first. `action` selects the handler; the scheduler
/// skips records whose action it does not recognise so old task documents
/// survive controller upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub name: String,
    pub priority: i32,
    pub action: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl TaskMetadata {
    pub const SCHEDULE_EVERY_CYCLE: &'static str = "every-cycle";
    pub const STATUS_IDLE: &'static str = "IDLE";
    pub const STATUS_RUNNING: &'static str = "RUNNING";
    pub const STATUS_FAILED: &'static str = "FAILED";

    pub fn new(name: &str, priority: i32, action: &str) -> Self {
        Self {
            name: name.to_string(),
            priority,
            action: action.to_string(),
            schedule: Self::SCHEDULE_EVERY_CYCLE.to_string(),
            status: Self::STATUS_IDLE.to_string(),
            last_run: None,
        }
    }
}
