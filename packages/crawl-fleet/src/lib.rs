//! Crawl fleet: partitions a crawl target list across worker processes and
//! keeps them running.
//!
//! Workers and the supervisor share nothing but a state directory of
//! atomically written JSON files (heartbeats, checkpoints, the work
//! assignment and its target snapshot), which doubles as the durability
//! layer across supervisor restarts.

pub mod config;
pub mod coordination;
pub mod error;
pub mod partition;
pub mod processor;
pub mod sources;
pub mod supervisor;
pub mod traits;
pub mod types;
pub mod worker;

pub use config::FleetConfig;
pub use error::{FleetError, ProcessError, Result};
pub use supervisor::Supervisor;
pub use traits::{ItemOutcome, TargetProcessor, TargetSource};
pub use types::{AssignmentKind, Target, TargetSnapshot, WorkAssignment, WorkRange, WorkerId};
pub use worker::{WorkerExit, WorkerRunner, WorkerSettings};
