use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::atomic::{atomic_write_json, read_json, remove_if_exists};
use crate::coordination::layout::StateLayout;
use crate::error::Result;
use crate::traits::ItemOutcome;
use crate::types::WorkerId;

/// Running totals for one worker's range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointCounters {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub errors: u64,
}

/// Durable "done" ledger for one worker.
///
/// A key missing from `completed_target_keys` means the target still needs
/// work. Deleted by the worker after a clean run; left behind on crash or
/// interruption so the next run resumes from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub worker_id: WorkerId,
    pub completed_target_keys: BTreeSet<String>,
    pub current_index: usize,
    pub counters: CheckpointCounters,
    pub last_target_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            completed_target_keys: BTreeSet::new(),
            current_index: 0,
            counters: CheckpointCounters::default(),
            last_target_key: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed_target_keys.contains(key)
    }

    pub fn record_success(&mut self, index: usize, key: &str, outcome: ItemOutcome) {
        self.completed_target_keys.insert(key.to_string());
        self.counters.processed += 1;
        self.counters.inserted += outcome.inserted;
        self.counters.updated += outcome.updated;
        self.current_index = index + 1;
        self.last_target_key = Some(key.to_string());
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, index: usize, key: &str) {
        self.counters.errors += 1;
        self.current_index = index + 1;
        self.last_target_key = Some(key.to_string());
        self.updated_at = Utc::now();
    }

    pub fn load(layout: &StateLayout, worker_id: WorkerId) -> Result<Option<Self>> {
        read_json(&layout.checkpoint_path(worker_id))
    }

    pub fn save(&self, layout: &StateLayout) -> Result<()> {
        atomic_write_json(&layout.checkpoint_path(self.worker_id), self)
    }

    pub fn delete(layout: &StateLayout, worker_id: WorkerId) -> Result<bool> {
        remove_if_exists(&layout.checkpoint_path(worker_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_error_update_counters() {
        let mut cp = Checkpoint::new(WorkerId(1));
        cp.record_success(4, "alpha", ItemOutcome::inserted(2));
        cp.record_success(5, "bravo", ItemOutcome::updated(1));
        cp.record_error(6, "charlie");

        assert!(cp.is_completed("alpha"));
        assert!(cp.is_completed("bravo"));
        assert!(!cp.is_completed("charlie"));
        assert_eq!(
            cp.counters,
            CheckpointCounters {
                processed: 2,
                inserted: 2,
                updated: 1,
                errors: 1,
            }
        );
        assert_eq!(cp.current_index, 7);
        assert_eq!(cp.last_target_key.as_deref(), Some("charlie"));
    }

    #[test]
    fn test_persisted_shape() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path());

        let mut cp = Checkpoint::new(WorkerId(2));
        cp.record_success(0, "alpha", ItemOutcome::default());
        cp.save(&layout).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(layout.checkpoint_path(WorkerId(2))).unwrap())
                .unwrap();
        assert_eq!(raw["worker_id"], 2);
        assert_eq!(raw["completed_target_keys"], serde_json::json!(["alpha"]));
        assert_eq!(raw["counters"]["processed"], 1);

        assert!(Checkpoint::delete(&layout, WorkerId(2)).unwrap());
        assert!(Checkpoint::load(&layout, WorkerId(2)).unwrap().is_none());
    }
}
