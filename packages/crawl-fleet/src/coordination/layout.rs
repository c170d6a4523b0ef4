//! On-disk layout of the shared state directory.
//!
//! ```text
//! <root>/
//!   heartbeats/worker_<id>.json
//!   checkpoints/worker_<id>_checkpoint.json
//!   logs/worker_<id>.log
//!   work_assignments.json
//!   remaining_targets.json
//!   completed_targets.json
//!   supervisor.pid
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::coordination::atomic::{atomic_write, atomic_write_json, read_json, remove_if_exists};
use crate::error::{FleetError, Result};
use crate::types::{TargetSnapshot, WorkAssignment, WorkerId};

const HEARTBEATS_DIR: &str = "heartbeats";
const CHECKPOINTS_DIR: &str = "checkpoints";
const LOGS_DIR: &str = "logs";
const ASSIGNMENT_FILE: &str = "work_assignments.json";
const SNAPSHOT_FILE: &str = "remaining_targets.json";
const LEDGER_FILE: &str = "completed_targets.json";
const SUPERVISOR_PID_FILE: &str = "supervisor.pid";

/// Paths inside a fleet state directory
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and its subdirectories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.heartbeats_dir(), self.checkpoints_dir(), self.logs_dir()] {
            fs::create_dir_all(&dir).map_err(|e| FleetError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn heartbeats_dir(&self) -> PathBuf {
        self.root.join(HEARTBEATS_DIR)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn heartbeat_path(&self, worker_id: WorkerId) -> PathBuf {
        self.heartbeats_dir().join(format!("worker_{}.json", worker_id))
    }

    pub fn checkpoint_path(&self, worker_id: WorkerId) -> PathBuf {
        self.checkpoints_dir()
            .join(format!("worker_{}_checkpoint.json", worker_id))
    }

    pub fn worker_log_path(&self, worker_id: WorkerId) -> PathBuf {
        self.logs_dir().join(format!("worker_{}.log", worker_id))
    }

    pub fn assignment_path(&self) -> PathBuf {
        self.root.join(ASSIGNMENT_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Keys completed by earlier partitions of the current run
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn supervisor_pid_path(&self) -> PathBuf {
        self.root.join(SUPERVISOR_PID_FILE)
    }

    /// Every heartbeat file present, whether or not its worker is part of
    /// the current assignment.
    pub fn list_heartbeat_files(&self) -> Result<Vec<(WorkerId, PathBuf)>> {
        list_worker_files(&self.heartbeats_dir(), "worker_", ".json")
    }

    /// Every checkpoint file present.
    pub fn list_checkpoint_files(&self) -> Result<Vec<(WorkerId, PathBuf)>> {
        list_worker_files(&self.checkpoints_dir(), "worker_", "_checkpoint.json")
    }

    pub fn load_assignment(&self) -> Result<Option<WorkAssignment>> {
        read_json(&self.assignment_path())
    }

    pub fn save_assignment(&self, assignment: &WorkAssignment) -> Result<()> {
        atomic_write_json(&self.assignment_path(), assignment)
    }

    pub fn load_snapshot(&self) -> Result<Option<TargetSnapshot>> {
        read_json(&self.snapshot_path())
    }

    pub fn save_snapshot(&self, snapshot: &TargetSnapshot) -> Result<()> {
        atomic_write_json(&self.snapshot_path(), snapshot)
    }

    pub fn write_supervisor_pid(&self, pid: u32) -> Result<()> {
        atomic_write(&self.supervisor_pid_path(), format!("{}\n", pid).as_bytes())
    }

    pub fn read_supervisor_pid(&self) -> Result<Option<u32>> {
        let path = self.supervisor_pid_path();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content.trim().parse().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FleetError::io(&path, e)),
        }
    }

    pub fn remove_supervisor_pid(&self) -> Result<bool> {
        remove_if_exists(&self.supervisor_pid_path())
    }
}

fn list_worker_files(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<(WorkerId, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FleetError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FleetError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let id = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .and_then(|id| id.parse::<u32>().ok());
        if let Some(id) = id {
            files.push((WorkerId(id), entry.path()));
        }
    }

    files.sort_by_key(|(id, _)| *id);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_naming_scheme() {
        let layout = StateLayout::new("/state");
        assert_eq!(
            layout.heartbeat_path(WorkerId(3)),
            PathBuf::from("/state/heartbeats/worker_3.json")
        );
        assert_eq!(
            layout.checkpoint_path(WorkerId(3)),
            PathBuf::from("/state/checkpoints/worker_3_checkpoint.json")
        );
        assert_eq!(
            layout.assignment_path(),
            PathBuf::from("/state/work_assignments.json")
        );
    }

    #[test]
    fn test_listing_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path());
        layout.ensure_dirs().unwrap();

        fs::write(layout.checkpoint_path(WorkerId(2)), b"{}").unwrap();
        fs::write(layout.checkpoint_path(WorkerId(10)), b"{}").unwrap();
        fs::write(layout.checkpoints_dir().join("notes.txt"), b"").unwrap();
        fs::write(layout.heartbeat_path(WorkerId(1)), b"{}").unwrap();

        let checkpoints: Vec<_> = layout
            .list_checkpoint_files()
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(checkpoints, vec![WorkerId(2), WorkerId(10)]);

        let heartbeats = layout.list_heartbeat_files().unwrap();
        assert_eq!(heartbeats.len(), 1);
        assert_eq!(heartbeats[0].0, WorkerId(1));
    }

    #[test]
    fn test_listing_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path().join("never-created"));
        assert!(layout.list_heartbeat_files().unwrap().is_empty());
    }

    #[test]
    fn test_supervisor_pid_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path());

        assert_eq!(layout.read_supervisor_pid().unwrap(), None);
        layout.write_supervisor_pid(4242).unwrap();
        assert_eq!(layout.read_supervisor_pid().unwrap(), Some(4242));
        assert!(layout.remove_supervisor_pid().unwrap());
        assert!(!layout.remove_supervisor_pid().unwrap());
    }
}
