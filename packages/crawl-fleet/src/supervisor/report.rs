//! Structured results of supervisor operations.
//!
//! Every operation returns one of these instead of printing; the CLI renders
//! them as styled text or JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordination::HeartbeatStatus;
use crate::supervisor::health::WorkerHealth;
use crate::types::{AssignmentKind, WorkRange, WorkerId};

// =============================================================================
// Health check
// =============================================================================

/// Something the supervisor did, or declined to do, during a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SupervisorAction {
    Restarted {
        worker_id: WorkerId,
        pid: u32,
        restart_count: u32,
    },
    Killed {
        worker_id: WorkerId,
        pid: u32,
        /// Escalated to a forced kill
        forced: bool,
    },
    RestartDeferred {
        worker_id: WorkerId,
        retry_in_secs: i64,
    },
    RestartBudgetExhausted {
        worker_id: WorkerId,
        restart_count: u32,
    },
    SpawnFailed {
        worker_id: WorkerId,
        error: String,
    },
    HeartbeatUnreadable {
        worker_id: WorkerId,
        error: String,
    },
}

impl SupervisorAction {
    pub fn worker_id(&self) -> WorkerId {
        match self {
            Self::Restarted { worker_id, .. }
            | Self::Killed { worker_id, .. }
            | Self::RestartDeferred { worker_id, .. }
            | Self::RestartBudgetExhausted { worker_id, .. }
            | Self::SpawnFailed { worker_id, .. }
            | Self::HeartbeatUnreadable { worker_id, .. } => *worker_id,
        }
    }

    /// Needs an operator; the supervisor will not fix this on its own.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::RestartBudgetExhausted { .. }
                | Self::SpawnFailed { .. }
                | Self::HeartbeatUnreadable { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealthEntry {
    pub worker_id: WorkerId,
    pub range: WorkRange,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub health: WorkerHealth,
}

/// Result of one health-check cycle
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub workers: Vec<WorkerHealthEntry>,
    pub actions: Vec<SupervisorAction>,
}

impl HealthReport {
    /// True when every assigned worker has finished (vacuously so for an
    /// empty assignment).
    pub fn all_completed(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.health == WorkerHealth::Completed)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &SupervisorAction> {
        self.actions.iter().filter(|a| a.is_unresolved())
    }

    pub fn count(&self, label: &str) -> usize {
        self.workers
            .iter()
            .filter(|w| w.health.label() == label)
            .count()
    }
}

// =============================================================================
// Start / stop
// =============================================================================

/// Outcome of spawning one worker
#[derive(Debug, Clone, Serialize)]
pub struct SpawnedWorker {
    pub worker_id: WorkerId,
    pub range: WorkRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub started_at: DateTime<Utc>,
    /// Live workers of an earlier run that had stopped heartbeating
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stopped: Vec<StoppedWorker>,
    pub total_targets: usize,
    pub workers: Vec<SpawnedWorker>,
}

impl StartReport {
    pub fn nothing_to_do(&self) -> bool {
        self.total_targets == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Gone before it was signalled
    AlreadyExited,
    /// Exited within the grace period
    Terminated,
    /// Force-killed after the grace period
    Killed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StoppedWorker {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub outcome: StopOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub stopped_at: DateTime<Utc>,
    pub workers: Vec<StoppedWorker>,
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentSummary {
    pub created_at: DateTime<Utc>,
    pub kind: AssignmentKind,
    pub total_targets: usize,
    pub worker_count: usize,
}

/// Read-only view of one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatusEntry {
    pub worker_id: WorkerId,
    pub range: WorkRange,
    pub pid: Option<u32>,
    pub status: Option<HeartbeatStatus>,
    pub health: WorkerHealth,
    pub heartbeat_age_secs: Option<i64>,
    pub current_target: Option<String>,
    pub targets_processed: usize,
    pub targets_total: usize,
    /// Keys in the worker's checkpoint file
    pub checkpointed: usize,
    pub restart_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub supervisor_pid: Option<u32>,
    pub assignment: Option<AssignmentSummary>,
    /// Keys finished before the current partition
    pub previously_completed: usize,
    pub workers: Vec<WorkerStatusEntry>,
}

impl StatusReport {
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.targets_processed).sum()
    }

    /// Fraction of the current partition visited, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match &self.assignment {
            Some(a) if a.total_targets > 0 => {
                (self.processed() as f64 / a.total_targets as f64).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }
}

// =============================================================================
// Rebalance
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub rebalanced_at: DateTime<Utc>,
    pub stopped: Vec<StoppedWorker>,
    pub canonical_total: usize,
    /// Distinct keys read from checkpoint files
    pub checkpointed_keys: usize,
    /// Canonical targets already done
    pub completed_total: usize,
    pub remaining_total: usize,
    pub workers: Vec<SpawnedWorker>,
}

impl RebalanceReport {
    pub fn is_finished(&self) -> bool {
        self.remaining_total == 0
    }
}
