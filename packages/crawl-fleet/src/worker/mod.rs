//! Worker side: processes one index range of the target snapshot.
//!
//! A worker writes its heartbeat on an independent ticker, resumes from its
//! checkpoint, and stops cooperatively between targets.

mod runner;
mod shutdown;
mod ticker;

pub use runner::{
    WorkerExit, WorkerRunner, WorkerSettings, EXIT_COMPLETED, EXIT_FAILED, EXIT_INTERRUPTED,
};
pub use shutdown::listen_for_shutdown;
pub use ticker::HeartbeatTicker;
