//! Filesystem coordination between the supervisor and its workers.
//!
//! Workers own their heartbeat and checkpoint files exclusively for writing.
//! The supervisor reads them, and deletes them only during rebalance cleanup.

pub mod atomic;
mod checkpoint;
mod heartbeat;
mod layout;
mod ledger;

pub use atomic::{atomic_write, atomic_write_json, read_json, remove_if_exists};
pub use checkpoint::{Checkpoint, CheckpointCounters};
pub use heartbeat::{Heartbeat, HeartbeatStatus};
pub use layout::StateLayout;
pub use ledger::CompletedLedger;
