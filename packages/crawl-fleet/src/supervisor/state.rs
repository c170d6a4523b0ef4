use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{WorkRange, WorkerId};

/// Supervisor's view of a worker's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Running,
    Crashed,
    Completed,
    Killed,
}

/// In-memory worker bookkeeping.
///
/// Rebuilt lazily from the persisted assignment and never persisted itself;
/// heartbeat and checkpoint files are what survive a supervisor restart.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub pid: Option<u32>,
    pub range: WorkRange,
    pub status: WorkerStatus,
    pub restart_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    pub last_restart: Option<DateTime<Utc>>,
    /// When this supervisor last spawned a process for the worker
    pub spawned_at: Option<DateTime<Utc>>,
}

impl WorkerState {
    pub fn new(range: WorkRange) -> Self {
        Self {
            worker_id: range.worker_id,
            pid: None,
            range,
            status: WorkerStatus::Pending,
            restart_count: 0,
            last_exit_code: None,
            last_restart: None,
            spawned_at: None,
        }
    }
}
