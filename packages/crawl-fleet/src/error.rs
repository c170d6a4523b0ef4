//! Typed errors for the crawl fleet.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Per-target failures
//! have their own type, [`ProcessError`], because they are counted in a
//! worker's checkpoint and never abort a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::WorkerId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors raised by coordination, worker and supervisor operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Filesystem operation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be encoded or decoded
    #[error("invalid JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration is missing or inconsistent
    #[error("config error: {0}")]
    Config(String),

    /// Partitioning was asked for zero workers
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// A worker range does not fit the target snapshot it was given
    #[error("range [{start}, {end}) is outside a snapshot of {total} targets")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        total: usize,
    },

    /// The target source collaborator failed
    #[error("target source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A worker process could not be spawned
    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: WorkerId,
        #[source]
        source: std::io::Error,
    },

    /// Signalling or probing an OS process failed
    #[error("process control error: {0}")]
    Process(String),

    /// A live worker already owns the state directory
    #[error("worker {worker_id} is still running (pid {pid})")]
    AlreadyRunning { worker_id: WorkerId, pid: u32 },

    /// No work assignment has been persisted yet
    #[error("no work assignment found; run start first")]
    NoAssignment,
}

impl FleetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(err))
    }
}

/// Errors a target processor reports for a single target.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The target could not be fetched or stored
    #[error("target {key} failed: {reason}")]
    Failed { key: String, reason: String },

    /// The target exceeded its processing deadline
    #[error("target {key} timed out after {secs}s")]
    Timeout { key: String, secs: u64 },

    /// The processor could not be started at all
    #[error("processor unavailable: {0}")]
    Unavailable(#[source] std::io::Error),
}
