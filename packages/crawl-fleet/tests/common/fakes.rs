//! In-memory collaborators: a fake process table behind the launcher and
//! process-control seams, and recording target processors.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crawl_fleet::error::{FleetError, ProcessError, Result};
use crawl_fleet::supervisor::{ProcessControl, WorkerLauncher, WorkerProcess};
use crawl_fleet::{ItemOutcome, Target, TargetProcessor, WorkRange, WorkerId};

// =============================================================================
// Fake processes
// =============================================================================

struct FleetState {
    next_pid: u32,
    /// pid -> exit code once exited
    exits: BTreeMap<u32, Option<i32>>,
    launches: Vec<(WorkRange, u32)>,
    signals: Vec<(u32, bool)>,
    ignore_graceful: HashSet<u32>,
    failing_launches: usize,
}

/// Process table shared by [`FakeLauncher`] and [`FakeControl`].
#[derive(Clone)]
pub struct FakeFleet {
    inner: Arc<Mutex<FleetState>>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FleetState {
                next_pid: 1000,
                exits: BTreeMap::new(),
                launches: Vec::new(),
                signals: Vec::new(),
                ignore_graceful: HashSet::new(),
                failing_launches: 0,
            })),
        }
    }

    pub fn launcher(&self) -> Box<dyn WorkerLauncher> {
        Box::new(FakeLauncher(self.clone()))
    }

    pub fn control(&self) -> Box<dyn ProcessControl> {
        Box::new(FakeControl(self.clone()))
    }

    /// A live process this fleet never launched (e.g. one started by an
    /// earlier supervisor).
    pub fn spawn_external(&self) -> u32 {
        let mut state = self.inner.lock().unwrap();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.exits.insert(pid, None);
        pid
    }

    pub fn exit(&self, pid: u32, code: i32) {
        self.inner.lock().unwrap().exits.insert(pid, Some(code));
    }

    /// Make the latest process launched for `worker_id` exit with `code`.
    pub fn crash_worker(&self, worker_id: WorkerId, code: i32) -> u32 {
        let pid = self
            .latest_pid(worker_id)
            .expect("worker was never launched");
        self.exit(pid, code);
        pid
    }

    pub fn latest_pid(&self, worker_id: WorkerId) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .launches
            .iter()
            .rev()
            .find(|(range, _)| range.worker_id == worker_id)
            .map(|(_, pid)| *pid)
    }

    pub fn launches(&self) -> Vec<WorkRange> {
        self.inner
            .lock()
            .unwrap()
            .launches
            .iter()
            .map(|(range, _)| *range)
            .collect()
    }

    pub fn launches_for(&self, worker_id: WorkerId) -> Vec<WorkRange> {
        self.launches()
            .into_iter()
            .filter(|range| range.worker_id == worker_id)
            .collect()
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        matches!(self.inner.lock().unwrap().exits.get(&pid), Some(None))
    }

    pub fn ignore_graceful(&self, pid: u32) {
        self.inner.lock().unwrap().ignore_graceful.insert(pid);
    }

    pub fn fail_next_launches(&self, count: usize) {
        self.inner.lock().unwrap().failing_launches = count;
    }

    pub fn signals(&self) -> Vec<(u32, bool)> {
        self.inner.lock().unwrap().signals.clone()
    }
}

struct FakeLauncher(FakeFleet);

impl WorkerLauncher for FakeLauncher {
    fn launch(&self, range: &WorkRange) -> Result<Box<dyn WorkerProcess>> {
        let mut state = self.0.inner.lock().unwrap();
        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(FleetError::Spawn {
                worker_id: range.worker_id,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "fleet binary missing"),
            });
        }

        let pid = state.next_pid;
        state.next_pid += 1;
        state.exits.insert(pid, None);
        state.launches.push((*range, pid));

        Ok(Box::new(FakeProcess {
            pid,
            fleet: self.0.clone(),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    fleet: FakeFleet,
}

impl WorkerProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self
            .fleet
            .inner
            .lock()
            .unwrap()
            .exits
            .get(&self.pid)
            .copied()
            .flatten())
    }
}

struct FakeControl(FakeFleet);

impl ProcessControl for FakeControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.0.is_alive(pid)
    }

    fn terminate(&self, pid: u32, graceful: bool) -> Result<()> {
        let mut state = self.0.inner.lock().unwrap();
        state.signals.push((pid, graceful));

        let alive = matches!(state.exits.get(&pid), Some(None));
        if alive && !(graceful && state.ignore_graceful.contains(&pid)) {
            state.exits.insert(pid, Some(-1));
        }
        Ok(())
    }
}

// =============================================================================
// Target processors
// =============================================================================

/// Records every key it is asked to process; fails on configured keys.
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    seen: Arc<Mutex<Vec<String>>>,
    failing: Arc<HashSet<String>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: Arc::default(),
            failing: Arc::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl TargetProcessor for RecordingProcessor {
    async fn process(&self, target: &Target) -> std::result::Result<ItemOutcome, ProcessError> {
        self.seen.lock().unwrap().push(target.key.clone());

        if self.failing.contains(&target.key) {
            return Err(ProcessError::Failed {
                key: target.key.clone(),
                reason: "upstream returned 503".into(),
            });
        }
        Ok(ItemOutcome::inserted(1))
    }
}

/// Processes `limit` targets, then hangs forever on the next one, the way a
/// worker wedged in a crawl looks from outside.
#[derive(Clone)]
pub struct StallingProcessor {
    pub recorder: RecordingProcessor,
    limit: usize,
}

impl StallingProcessor {
    pub fn new(limit: usize) -> Self {
        Self {
            recorder: RecordingProcessor::new(),
            limit,
        }
    }
}

#[async_trait]
impl TargetProcessor for StallingProcessor {
    async fn process(&self, target: &Target) -> std::result::Result<ItemOutcome, ProcessError> {
        if self.recorder.seen_count() >= self.limit {
            std::future::pending::<()>().await;
        }
        self.recorder.process(target).await
    }
}

/// Cancels the worker's shutdown token after `after` targets, as a SIGTERM
/// arriving mid-range would.
#[derive(Clone)]
pub struct InterruptingProcessor {
    pub recorder: RecordingProcessor,
    token: CancellationToken,
    after: usize,
}

impl InterruptingProcessor {
    pub fn new(token: CancellationToken, after: usize) -> Self {
        Self {
            recorder: RecordingProcessor::new(),
            token,
            after,
        }
    }
}

#[async_trait]
impl TargetProcessor for InterruptingProcessor {
    async fn process(&self, target: &Target) -> std::result::Result<ItemOutcome, ProcessError> {
        let outcome = self.recorder.process(target).await;
        if self.recorder.seen_count() >= self.after {
            self.token.cancel();
        }
        outcome
    }
}
