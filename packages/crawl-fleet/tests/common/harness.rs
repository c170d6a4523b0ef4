//! Per-test state directory and builders for supervisors and workers.

#![allow(dead_code)]

use std::ops::Range;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use test_context::AsyncTestContext;

use crawl_fleet::coordination::{Checkpoint, Heartbeat, HeartbeatStatus, StateLayout};
use crawl_fleet::sources::StaticTargetSource;
use crawl_fleet::{
    FleetConfig, ItemOutcome, Supervisor, Target, TargetSnapshot, WorkRange, WorkerId,
    WorkerRunner, WorkerSettings,
};

use super::FakeFleet;

/// Pid recorded in heartbeats written by in-process worker runs
pub const WORKER_PID: u32 = 4242;

/// Test harness owning a throwaway state directory.
///
/// # Example using test-context
///
/// ```ignore
/// #[test_context(FleetHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &FleetHarness) {
///     let layout = ctx.layout();
/// }
/// ```
pub struct FleetHarness {
    dir: TempDir,
    layout: StateLayout,
}

impl AsyncTestContext for FleetHarness {
    async fn setup() -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().expect("Failed to create state dir");
        let layout = StateLayout::new(dir.path());
        Self { dir, layout }
    }

    async fn teardown(self) {
        // TempDir removes the state directory on drop
    }
}

impl FleetHarness {
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Config pointed at this state directory with fast timings.
    pub fn config(&self, workers: usize) -> FleetConfig {
        let mut config = FleetConfig::default();
        config.state_dir = self.dir.path().to_path_buf();
        config.workers.count = workers;
        config.workers.checkpoint_interval = 5;
        config.health.stop_timeout_secs = 0;
        config
    }

    pub fn supervisor(&self, config: &FleetConfig, targets: Vec<Target>, fleet: &FakeFleet) -> Supervisor {
        Supervisor::new(
            config,
            Box::new(StaticTargetSource::new(targets)),
            fleet.launcher(),
            fleet.control(),
        )
    }

    pub fn runner(&self, range: WorkRange, checkpoint_interval: usize) -> WorkerRunner {
        WorkerRunner::new(
            self.layout.clone(),
            WorkerSettings {
                range,
                checkpoint_interval,
                heartbeat_interval: Duration::from_millis(50),
            },
        )
        .with_pid(WORKER_PID)
    }

    pub fn write_snapshot(&self, targets: Vec<Target>) -> TargetSnapshot {
        let snapshot = TargetSnapshot::new(targets);
        self.layout.save_snapshot(&snapshot).unwrap();
        snapshot
    }

    pub fn snapshot(&self) -> TargetSnapshot {
        self.layout
            .load_snapshot()
            .unwrap()
            .expect("no snapshot persisted")
    }

    /// Persist a checkpoint marking `keys` complete.
    pub fn write_checkpoint(&self, worker_id: WorkerId, keys: &[String]) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(worker_id);
        for (i, key) in keys.iter().enumerate() {
            checkpoint.record_success(i, key, ItemOutcome::inserted(1));
        }
        checkpoint.save(&self.layout).unwrap();
        checkpoint
    }

    /// Persist a heartbeat as a worker process started just now would.
    pub fn write_heartbeat(
        &self,
        worker_id: WorkerId,
        pid: u32,
        status: HeartbeatStatus,
        processed: usize,
    ) -> Heartbeat {
        let mut heartbeat = Heartbeat::starting(worker_id, pid, 10);
        heartbeat.status = status;
        heartbeat.targets_processed = processed;
        heartbeat.last_heartbeat = Utc::now();
        heartbeat.save(&self.layout).unwrap();
        heartbeat
    }

    pub fn checkpoint_count(&self) -> usize {
        self.layout.list_checkpoint_files().unwrap().len()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.layout.list_heartbeat_files().unwrap().len()
    }
}

/// `count` targets whose keys sort in index order.
pub fn numbered_targets(count: usize) -> Vec<Target> {
    (0..count)
        .map(|i| Target::new(format!("target-{:03}", i)).with_url(format!("https://example.org/{}", i)))
        .collect()
}

/// Keys of `targets[range]`.
pub fn keys(targets: &[Target], range: Range<usize>) -> Vec<String> {
    targets[range].iter().map(|t| t.key.clone()).collect()
}

pub fn bounds(ranges: &[WorkRange]) -> Vec<(usize, usize)> {
    ranges.iter().map(|r| (r.start_index, r.end_index)).collect()
}
