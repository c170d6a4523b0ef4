use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::atomic::{atomic_write_json, read_json};
use crate::coordination::layout::StateLayout;
use crate::error::Result;
use crate::types::WorkerId;

/// Lifecycle status a worker reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Starting,
    Running,
    Completed,
    Failed,
}

impl HeartbeatStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Liveness and progress record, rewritten wholesale on every tick.
///
/// Owned by the worker; the supervisor only reads it (and deletes it during
/// rebalance cleanup).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_target: Option<String>,
    pub targets_processed: usize,
    pub targets_total: usize,
    pub status: HeartbeatStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Heartbeat {
    pub fn starting(worker_id: WorkerId, pid: u32, targets_total: usize) -> Self {
        let now = Utc::now();
        Self {
            worker_id,
            pid,
            started_at: now,
            last_heartbeat: now,
            current_target: None,
            targets_processed: 0,
            targets_total,
            status: HeartbeatStatus::Starting,
            error: None,
        }
    }

    /// Time since the last write, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).max(Duration::zero())
    }

    pub fn load(layout: &StateLayout, worker_id: WorkerId) -> Result<Option<Self>> {
        read_json(&layout.heartbeat_path(worker_id))
    }

    pub fn save(&self, layout: &StateLayout) -> Result<()> {
        atomic_write_json(&layout.heartbeat_path(self.worker_id), self)
    }
}
