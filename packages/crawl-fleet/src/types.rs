use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One crawlable unit, identified by a stable sortable key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Target {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Worker identifier (index of its partition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl WorkerId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Half-open index range `[start_index, end_index)` owned by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRange {
    pub worker_id: WorkerId,
    pub start_index: usize,
    pub end_index: usize,
}

impl WorkRange {
    pub fn new(worker_id: WorkerId, start_index: usize, end_index: usize) -> Self {
        Self {
            worker_id,
            start_index,
            end_index,
        }
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }
}

impl fmt::Display for WorkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_index, self.end_index)
    }
}

/// Why an assignment was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Initial,
    Rebalance,
}

/// Partition of a frozen, sorted target snapshot across workers.
///
/// The ranges index into the [`TargetSnapshot`] persisted with it, which for
/// a rebalance is the remaining subset rather than the canonical list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub created_at: DateTime<Utc>,
    pub total_targets: usize,
    pub kind: AssignmentKind,
    pub ranges: Vec<WorkRange>,
    /// Set by an operator stop; a stopped assignment is never restarted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl WorkAssignment {
    pub fn range_for(&self, worker_id: WorkerId) -> Option<&WorkRange> {
        self.ranges.iter().find(|r| r.worker_id == worker_id)
    }

    pub fn worker_ids(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.ranges.iter().map(|r| r.worker_id)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// The sorted target list an assignment partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub created_at: DateTime<Utc>,
    pub targets: Vec<Target>,
}

impl TargetSnapshot {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            created_at: Utc::now(),
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
