//! Supervisor side: spawns workers, classifies their health from process
//! exits and heartbeat files, restarts within a budget, and repartitions
//! the remaining work on demand.

mod health;
mod manager;
mod policy;
mod process;
mod report;
mod state;

pub use health::{classify_age, classify_exit, classify_heartbeat, HealthThresholds, WorkerHealth};
pub use manager::Supervisor;
pub use policy::{RestartDecision, RestartPolicy};
pub use process::{
    CommandLauncher, ProcessControl, SystemProcessControl, WorkerLauncher, WorkerProcess,
};
pub use report::{
    AssignmentSummary, HealthReport, RebalanceReport, SpawnedWorker, StartReport, StatusReport,
    StopOutcome, StopReport, StoppedWorker, SupervisorAction, WorkerHealthEntry,
    WorkerStatusEntry,
};
pub use state::{WorkerState, WorkerStatus};
