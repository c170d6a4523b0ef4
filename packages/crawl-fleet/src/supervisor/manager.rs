use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FleetConfig;
use crate::coordination::{
    read_json, remove_if_exists, Checkpoint, CompletedLedger, Heartbeat, HeartbeatStatus,
    StateLayout,
};
use crate::error::{FleetError, Result};
use crate::partition::{plan_assignment, sort_targets};
use crate::supervisor::health::{
    classify_age, classify_exit, classify_heartbeat, HealthThresholds, WorkerHealth,
};
use crate::supervisor::policy::{RestartDecision, RestartPolicy};
use crate::supervisor::process::{ProcessControl, WorkerLauncher, WorkerProcess};
use crate::supervisor::report::{
    AssignmentSummary, HealthReport, RebalanceReport, SpawnedWorker, StartReport, StatusReport,
    StopOutcome, StopReport, StoppedWorker, SupervisorAction, WorkerHealthEntry,
    WorkerStatusEntry,
};
use crate::supervisor::state::{WorkerState, WorkerStatus};
use crate::traits::TargetSource;
use crate::types::{AssignmentKind, Target, TargetSnapshot, WorkAssignment, WorkerId};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owns the worker fleet for one state directory.
///
/// Constructed explicitly and handed to whichever entrypoint needs it. All
/// durable state lives in the state directory; the in-memory worker table
/// only carries restart bookkeeping and live process handles, and is
/// rebuilt whenever a new assignment appears on disk.
pub struct Supervisor {
    layout: StateLayout,
    worker_count: usize,
    stop_timeout: Duration,
    policy: RestartPolicy,
    thresholds: HealthThresholds,
    source: Box<dyn TargetSource>,
    launcher: Box<dyn WorkerLauncher>,
    control: Box<dyn ProcessControl>,
    workers: BTreeMap<WorkerId, WorkerState>,
    handles: HashMap<WorkerId, Box<dyn WorkerProcess>>,
    assignment_created_at: Option<DateTime<Utc>>,
    pid: u32,
}

impl Supervisor {
    pub fn new(
        config: &FleetConfig,
        source: Box<dyn TargetSource>,
        launcher: Box<dyn WorkerLauncher>,
        control: Box<dyn ProcessControl>,
    ) -> Self {
        Self {
            layout: StateLayout::new(config.state_dir.clone()),
            worker_count: config.workers.count,
            stop_timeout: config.stop_timeout(),
            policy: RestartPolicy {
                max_restarts_per_worker: config.health.max_restarts_per_worker,
                restart_cooldown: config.restart_cooldown(),
            },
            thresholds: HealthThresholds {
                heartbeat_timeout: config.heartbeat_timeout(),
                stale_kill_timeout: config.stale_kill_timeout(),
            },
            source,
            launcher,
            control,
            workers: BTreeMap::new(),
            handles: HashMap::new(),
            assignment_created_at: None,
            pid: std::process::id(),
        }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn worker_state(&self, worker_id: WorkerId) -> Option<&WorkerState> {
        self.workers.get(&worker_id)
    }

    // =========================================================================
    // StartAll
    // =========================================================================

    /// Partition the canonical target list and spawn one worker per range.
    ///
    /// Existing checkpoints are left in place, so workers whose range lines
    /// up with a previous run resume from them. Leftover heartbeats are kept
    /// too: a worker that is still alive but has gone quiet is stopped
    /// first, and the rest are ignored as predating the new spawns.
    pub async fn start_all(&mut self) -> Result<StartReport> {
        let started_at = Utc::now();
        self.layout.ensure_dirs()?;
        self.ensure_not_running(started_at)?;

        let lingering: Vec<_> = self
            .known_pids()?
            .into_iter()
            .filter(|(_, pid)| self.control.is_alive(*pid))
            .collect();
        let stopped = if lingering.is_empty() {
            Vec::new()
        } else {
            info!(workers = lingering.len(), "Stopping unresponsive workers from a previous run");
            self.stop_processes(lingering).await
        };

        let targets = self.source.fetch_targets().await?;
        let (snapshot, assignment) =
            plan_assignment(targets, self.worker_count, AssignmentKind::Initial)?;

        // New run: forget what earlier partitions finished
        CompletedLedger::clear(&self.layout)?;

        self.persist_partition(&snapshot, &assignment)?;

        if snapshot.is_empty() {
            info!("Canonical target list is empty; nothing to spawn");
        } else {
            info!(
                total_targets = snapshot.len(),
                workers = assignment.ranges.len(),
                "Starting workers"
            );
        }

        let workers = self.spawn_all(Utc::now());

        Ok(StartReport {
            started_at,
            stopped,
            total_targets: snapshot.len(),
            workers,
        })
    }

    fn ensure_not_running(&self, now: DateTime<Utc>) -> Result<()> {
        for (worker_id, path) in self.layout.list_heartbeat_files()? {
            let heartbeat: Heartbeat = match read_json(&path) {
                Ok(Some(hb)) => hb,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Ignoring unreadable heartbeat");
                    continue;
                }
            };

            if heartbeat.status.is_terminal() {
                continue;
            }
            if heartbeat.age(now) <= self.thresholds.heartbeat_timeout
                && self.control.is_alive(heartbeat.pid)
            {
                return Err(FleetError::AlreadyRunning {
                    worker_id,
                    pid: heartbeat.pid,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // CheckOnce
    // =========================================================================

    /// Run one health-check cycle now.
    pub async fn check_once(&mut self) -> Result<HealthReport> {
        self.check_at(Utc::now()).await
    }

    /// Run one health-check cycle as of `now`.
    pub async fn check_at(&mut self, now: DateTime<Utc>) -> Result<HealthReport> {
        self.sync_assignment()?;

        let mut actions = Vec::new();
        let mut entries = Vec::with_capacity(self.workers.len());
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();

        for worker_id in ids {
            let health = self.assess(worker_id, now, &mut actions);
            let killed = self.apply_health(worker_id, &health);

            if !killed {
                self.act(worker_id, &health, now, &mut actions).await;
            }

            if let Some(state) = self.workers.get(&worker_id) {
                entries.push(WorkerHealthEntry {
                    worker_id,
                    range: state.range,
                    pid: state.pid,
                    restart_count: state.restart_count,
                    health,
                });
            }
        }

        let report = HealthReport {
            checked_at: now,
            workers: entries,
            actions,
        };

        info!(
            healthy = report.count("healthy"),
            crashed = report.count("crashed"),
            stale = report.count("stale"),
            completed = report.count("completed"),
            unknown = report.count("unknown"),
            actions = report.actions.len(),
            "Health check complete"
        );

        Ok(report)
    }

    /// Rebuild the worker table when the persisted assignment changed.
    fn sync_assignment(&mut self) -> Result<()> {
        let assignment = self
            .layout
            .load_assignment()?
            .ok_or(FleetError::NoAssignment)?;

        if self.assignment_created_at != Some(assignment.created_at) {
            debug!(
                created_at = %assignment.created_at,
                workers = assignment.ranges.len(),
                "Loading work assignment"
            );
            self.install_assignment(&assignment);
        }

        if assignment.is_stopped() {
            for state in self.workers.values_mut() {
                state.status = WorkerStatus::Killed;
            }
        }

        Ok(())
    }

    fn install_assignment(&mut self, assignment: &WorkAssignment) {
        self.handles.clear();
        self.workers = assignment
            .ranges
            .iter()
            .map(|range| (range.worker_id, WorkerState::new(*range)))
            .collect();
        self.assignment_created_at = Some(assignment.created_at);
    }

    fn assess(
        &mut self,
        worker_id: WorkerId,
        now: DateTime<Utc>,
        actions: &mut Vec<SupervisorAction>,
    ) -> WorkerHealth {
        let Some(state) = self.workers.get_mut(&worker_id) else {
            return WorkerHealth::unknown("not in assignment");
        };

        if let Some(process) = self.handles.get_mut(&worker_id) {
            match process.try_exit_code() {
                Ok(Some(code)) => {
                    self.handles.remove(&worker_id);
                    state.pid = None;
                    state.last_exit_code = Some(code);
                    if code != 0 {
                        warn!(worker_id = %worker_id, exit_code = code, "Worker process exited");
                    }
                    return classify_exit(code);
                }
                Ok(None) => {}
                Err(e) => warn!(worker_id = %worker_id, error = %e, "Failed to poll worker process"),
            }
        } else if state.pid.is_none() {
            // Nothing of ours is running; the last heartbeat would be stale news
            match state.status {
                WorkerStatus::Crashed => {
                    return WorkerHealth::Crashed {
                        exit_code: state.last_exit_code,
                        error: Some("no worker process running".into()),
                    }
                }
                WorkerStatus::Completed => return WorkerHealth::Completed,
                _ => {}
            }
        }

        let heartbeat = match Heartbeat::load(&self.layout, worker_id) {
            Ok(hb) => hb,
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "Heartbeat unreadable");
                actions.push(SupervisorAction::HeartbeatUnreadable {
                    worker_id,
                    error: e.to_string(),
                });
                return WorkerHealth::unknown("heartbeat unreadable");
            }
        };

        // A heartbeat from before the latest spawn belongs to the old process
        let heartbeat = heartbeat.filter(|hb| {
            state
                .spawned_at
                .map_or(true, |spawned| hb.started_at >= spawned)
        });

        match heartbeat {
            Some(hb) => {
                if !self.handles.contains_key(&worker_id)
                    && !hb.status.is_terminal()
                    && state.pid != Some(hb.pid)
                {
                    debug!(worker_id = %worker_id, pid = hb.pid, "Adopting worker pid from heartbeat");
                    state.pid = Some(hb.pid);
                }
                classify_heartbeat(Some(&hb), now, &self.thresholds)
            }
            None => match state.spawned_at {
                Some(spawned) => match classify_age(now - spawned, &self.thresholds) {
                    WorkerHealth::Healthy => WorkerHealth::unknown("awaiting first heartbeat"),
                    silent => silent,
                },
                None => WorkerHealth::unknown("no heartbeat file"),
            },
        }
    }

    /// Record `health` on the worker. Returns true for workers an operator
    /// stopped, which are reported but never acted on.
    fn apply_health(&mut self, worker_id: WorkerId, health: &WorkerHealth) -> bool {
        let Some(state) = self.workers.get_mut(&worker_id) else {
            return true;
        };
        if state.status == WorkerStatus::Killed {
            return true;
        }

        match health {
            WorkerHealth::Healthy | WorkerHealth::Stale { .. } => {
                state.status = WorkerStatus::Running
            }
            WorkerHealth::Crashed { .. } => state.status = WorkerStatus::Crashed,
            WorkerHealth::Completed => state.status = WorkerStatus::Completed,
            WorkerHealth::Unknown { .. } => {}
        }
        false
    }

    async fn act(
        &mut self,
        worker_id: WorkerId,
        health: &WorkerHealth,
        now: DateTime<Utc>,
        actions: &mut Vec<SupervisorAction>,
    ) {
        let stale_kill = match health {
            WorkerHealth::Crashed { .. } => None,
            WorkerHealth::Stale { force_kill, .. } => Some(*force_kill),
            _ => return,
        };

        let Some(state) = self.workers.get(&worker_id) else {
            return;
        };
        let (pid, restart_count) = (state.pid, state.restart_count);

        match self.policy.evaluate(state, now) {
            RestartDecision::Allowed => {}
            RestartDecision::CoolingDown { retry_in } => {
                debug!(
                    worker_id = %worker_id,
                    retry_in_secs = retry_in.num_seconds(),
                    "Restart deferred by cooldown"
                );
                actions.push(SupervisorAction::RestartDeferred {
                    worker_id,
                    retry_in_secs: retry_in.num_seconds(),
                });
                return;
            }
            RestartDecision::BudgetExhausted => {
                warn!(
                    worker_id = %worker_id,
                    restart_count,
                    "Restart budget exhausted; worker needs attention"
                );
                actions.push(SupervisorAction::RestartBudgetExhausted {
                    worker_id,
                    restart_count,
                });
                return;
            }
        }

        match (stale_kill, pid) {
            (Some(force_kill), Some(pid)) => {
                let outcome = self.stop_one(worker_id, pid, !force_kill).await;
                match outcome {
                    StopOutcome::Terminated | StopOutcome::Killed => {
                        actions.push(SupervisorAction::Killed {
                            worker_id,
                            pid,
                            forced: outcome == StopOutcome::Killed,
                        })
                    }
                    StopOutcome::AlreadyExited => {}
                    StopOutcome::Failed { error } => {
                        warn!(worker_id = %worker_id, pid, error = %error, "Could not kill stale worker")
                    }
                }
            }
            // A failed heartbeat can precede the process exit
            (None, Some(pid)) if self.handles.contains_key(&worker_id) => {
                self.stop_one(worker_id, pid, false).await;
            }
            _ => {}
        }

        let Some(state) = self.workers.get_mut(&worker_id) else {
            return;
        };
        state.restart_count += 1;
        state.last_restart = Some(now);
        let restart_count = state.restart_count;

        match self.spawn_worker(worker_id, now) {
            Ok(pid) => {
                info!(worker_id = %worker_id, pid, restart_count, "Restarted worker");
                actions.push(SupervisorAction::Restarted {
                    worker_id,
                    pid,
                    restart_count,
                });
            }
            Err(e) => {
                warn!(worker_id = %worker_id, restart_count, error = %e, "Failed to restart worker");
                actions.push(SupervisorAction::SpawnFailed {
                    worker_id,
                    error: e.to_string(),
                });
            }
        }
    }

    // =========================================================================
    // GetStatus
    // =========================================================================

    /// Aggregate persisted state into a report. Changes nothing.
    pub fn get_status(&self) -> Result<StatusReport> {
        let now = Utc::now();
        let assignment = self.layout.load_assignment()?;
        let supervisor_pid = self.layout.read_supervisor_pid()?;

        let previously_completed = match CompletedLedger::load(&self.layout) {
            Ok(ledger) => ledger.keys.len(),
            Err(e) => {
                warn!(error = %e, "Completed-target ledger unreadable");
                0
            }
        };

        let mut workers = Vec::new();
        if let Some(assignment) = &assignment {
            for range in &assignment.ranges {
                let worker_id = range.worker_id;

                let heartbeat = match Heartbeat::load(&self.layout, worker_id) {
                    Ok(hb) => hb.filter(|hb| hb.started_at >= assignment.created_at),
                    Err(e) => {
                        warn!(worker_id = %worker_id, error = %e, "Heartbeat unreadable");
                        None
                    }
                };
                let checkpointed = match Checkpoint::load(&self.layout, worker_id) {
                    Ok(cp) => cp.map_or(0, |cp| cp.completed_target_keys.len()),
                    Err(e) => {
                        warn!(worker_id = %worker_id, error = %e, "Checkpoint unreadable");
                        0
                    }
                };
                let state = self.workers.get(&worker_id);

                workers.push(WorkerStatusEntry {
                    worker_id,
                    range: *range,
                    pid: heartbeat
                        .as_ref()
                        .map(|hb| hb.pid)
                        .or_else(|| state.and_then(|s| s.pid)),
                    status: heartbeat.as_ref().map(|hb| hb.status),
                    health: classify_heartbeat(heartbeat.as_ref(), now, &self.thresholds),
                    heartbeat_age_secs: heartbeat.as_ref().map(|hb| hb.age(now).num_seconds()),
                    current_target: heartbeat.as_ref().and_then(|hb| hb.current_target.clone()),
                    targets_processed: heartbeat.as_ref().map_or(0, |hb| hb.targets_processed),
                    targets_total: range.len(),
                    checkpointed,
                    restart_count: state.map_or(0, |s| s.restart_count),
                });
            }
        }

        Ok(StatusReport {
            generated_at: now,
            supervisor_pid,
            assignment: assignment.as_ref().map(|a| AssignmentSummary {
                created_at: a.created_at,
                kind: a.kind,
                total_targets: a.total_targets,
                worker_count: a.ranges.len(),
            }),
            previously_completed,
            workers,
        })
    }

    // =========================================================================
    // StopAll
    // =========================================================================

    /// Stop every known worker and mark the assignment stopped so later
    /// checks do not revive it.
    pub async fn stop_all(&mut self) -> Result<StopReport> {
        let stopped_at = Utc::now();
        let targets = self.known_pids()?;
        info!(workers = targets.len(), "Stopping workers");

        let workers = self.stop_processes(targets).await;

        if let Some(mut assignment) = self.layout.load_assignment()? {
            assignment.stopped_at = Some(stopped_at);
            self.layout.save_assignment(&assignment)?;
        }
        for state in self.workers.values_mut() {
            state.status = WorkerStatus::Killed;
            state.pid = None;
        }
        self.layout.remove_supervisor_pid()?;

        Ok(StopReport {
            stopped_at,
            workers,
        })
    }

    /// Pids from every heartbeat file, overridden by live handles. Workers
    /// that reported a terminal status are skipped: their pid may already
    /// belong to someone else.
    fn known_pids(&self) -> Result<Vec<(WorkerId, u32)>> {
        let mut pids = BTreeMap::new();

        for (worker_id, path) in self.layout.list_heartbeat_files()? {
            match read_json::<Heartbeat>(&path) {
                Ok(Some(hb)) if !hb.status.is_terminal() => {
                    pids.insert(worker_id, hb.pid);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Skipping unreadable heartbeat")
                }
            }
        }
        for (worker_id, process) in &self.handles {
            pids.insert(*worker_id, process.pid());
        }

        Ok(pids.into_iter().collect())
    }

    /// Signal everything gracefully first, then give each process up to the
    /// stop timeout before forcing it.
    async fn stop_processes(&mut self, targets: Vec<(WorkerId, u32)>) -> Vec<StoppedWorker> {
        let mut stopped = Vec::with_capacity(targets.len());
        let mut signalled = Vec::new();

        for (worker_id, pid) in targets {
            if self.has_exited(worker_id, pid) {
                stopped.push(StoppedWorker {
                    worker_id,
                    pid,
                    outcome: StopOutcome::AlreadyExited,
                });
                continue;
            }
            if let Err(e) = self.control.terminate(pid, true) {
                warn!(worker_id = %worker_id, pid, error = %e, "Graceful stop failed; will force");
            }
            signalled.push((worker_id, pid));
        }

        for (worker_id, pid) in signalled {
            let outcome = if self.wait_for_exit(worker_id, pid).await {
                StopOutcome::Terminated
            } else {
                warn!(worker_id = %worker_id, pid, "Worker ignored graceful stop; forcing");
                self.force_kill(worker_id, pid).await
            };
            debug!(worker_id = %worker_id, pid, outcome = ?outcome, "Worker stopped");
            stopped.push(StoppedWorker {
                worker_id,
                pid,
                outcome,
            });
        }

        for entry in &stopped {
            self.handles.remove(&entry.worker_id);
        }
        stopped.sort_by_key(|entry| entry.worker_id);
        stopped
    }

    async fn stop_one(&mut self, worker_id: WorkerId, pid: u32, graceful: bool) -> StopOutcome {
        if graceful {
            return self
                .stop_processes(vec![(worker_id, pid)])
                .await
                .pop()
                .map(|entry| entry.outcome)
                .unwrap_or(StopOutcome::AlreadyExited);
        }

        let outcome = if self.has_exited(worker_id, pid) {
            StopOutcome::AlreadyExited
        } else {
            self.force_kill(worker_id, pid).await
        };
        self.handles.remove(&worker_id);
        outcome
    }

    async fn force_kill(&mut self, worker_id: WorkerId, pid: u32) -> StopOutcome {
        match self.control.terminate(pid, false) {
            Ok(()) => {
                // Reap our own child so it does not linger as a zombie
                self.wait_for_exit(worker_id, pid).await;
                StopOutcome::Killed
            }
            Err(e) => StopOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    fn has_exited(&mut self, worker_id: WorkerId, pid: u32) -> bool {
        if let Some(process) = self.handles.get_mut(&worker_id) {
            if process.pid() == pid {
                return match process.try_exit_code() {
                    Ok(Some(_)) => true,
                    Ok(None) => false,
                    Err(_) => !self.control.is_alive(pid),
                };
            }
        }
        !self.control.is_alive(pid)
    }

    async fn wait_for_exit(&mut self, worker_id: WorkerId, pid: u32) -> bool {
        let deadline = Instant::now() + self.stop_timeout;
        loop {
            if self.has_exited(worker_id, pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL.min(self.stop_timeout)).await;
        }
    }

    // =========================================================================
    // Rebalance
    // =========================================================================

    /// Stop everything, recompute the remaining work from every checkpoint,
    /// repartition it and respawn.
    pub async fn rebalance(&mut self) -> Result<RebalanceReport> {
        let rebalanced_at = Utc::now();
        self.layout.ensure_dirs()?;

        let previous = self.layout.load_assignment()?;
        let previous_snapshot = self.layout.load_snapshot()?;

        let targets = self.known_pids()?;
        info!(workers = targets.len(), "Rebalance: stopping workers");
        let stopped = self.stop_processes(targets).await;

        // Everything done must be collected before any file is deleted
        let mut done = CompletedLedger::load(&self.layout)?.keys;
        let checkpointed = self.collect_checkpointed_keys()?;
        let checkpointed_keys = checkpointed.len();
        done.extend(checkpointed);
        if let (Some(assignment), Some(snapshot)) = (&previous, &previous_snapshot) {
            done.extend(self.cleanly_completed_keys(assignment, snapshot));
        }

        let canonical = sort_targets(self.source.fetch_targets().await?);
        let canonical_total = canonical.len();
        let remaining: Vec<Target> = canonical
            .into_iter()
            .filter(|t| !done.contains(&t.key))
            .collect();
        let remaining_total = remaining.len();
        let completed_total = canonical_total - remaining_total;

        info!(
            canonical_total,
            checkpointed_keys,
            completed_total,
            remaining_total,
            "Rebalance: computed remaining targets"
        );

        CompletedLedger {
            updated_at: Some(rebalanced_at),
            keys: done,
        }
        .save(&self.layout)?;

        let removed = self.remove_worker_files()?;
        debug!(removed, "Rebalance: removed heartbeat and checkpoint files");

        let (snapshot, assignment) =
            plan_assignment(remaining, self.worker_count, AssignmentKind::Rebalance)?;
        self.persist_partition(&snapshot, &assignment)?;

        if snapshot.is_empty() {
            info!("Rebalance: every target is complete; nothing to spawn");
        }

        let workers = self.spawn_all(Utc::now());

        Ok(RebalanceReport {
            rebalanced_at,
            stopped,
            canonical_total,
            checkpointed_keys,
            completed_total,
            remaining_total,
            workers,
        })
    }

    /// Union of every checkpoint file in the directory, including ones for
    /// workers outside the current assignment. A corrupt checkpoint only
    /// costs rework and is skipped; an I/O failure aborts before cleanup.
    fn collect_checkpointed_keys(&self) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();

        for (worker_id, path) in self.layout.list_checkpoint_files()? {
            match read_json::<Checkpoint>(&path) {
                Ok(Some(checkpoint)) => {
                    debug!(
                        worker_id = %worker_id,
                        completed = checkpoint.completed_target_keys.len(),
                        "Read checkpoint"
                    );
                    keys.extend(checkpoint.completed_target_keys);
                }
                Ok(None) => {}
                Err(FleetError::Json { path, source }) => warn!(
                    worker_id = %worker_id,
                    path = %path.display(),
                    error = %source,
                    "Skipping corrupt checkpoint"
                ),
                Err(e) => return Err(e),
            }
        }

        Ok(keys)
    }

    /// Keys of ranges whose worker reported completion and removed its
    /// checkpoint, which is the only trace a clean finish leaves.
    fn cleanly_completed_keys(
        &self,
        assignment: &WorkAssignment,
        snapshot: &TargetSnapshot,
    ) -> Vec<String> {
        if snapshot.len() != assignment.total_targets {
            warn!(
                snapshot = snapshot.len(),
                assignment = assignment.total_targets,
                "Snapshot does not match assignment; not folding completed ranges"
            );
            return Vec::new();
        }

        let mut keys = Vec::new();
        for range in &assignment.ranges {
            let worker_id = range.worker_id;
            if self.layout.checkpoint_path(worker_id).exists() {
                continue;
            }

            let heartbeat = match Heartbeat::load(&self.layout, worker_id) {
                Ok(Some(hb)) => hb,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "Heartbeat unreadable");
                    continue;
                }
            };
            if heartbeat.status != HeartbeatStatus::Completed
                || heartbeat.started_at < assignment.created_at
            {
                continue;
            }

            if let Some(targets) = snapshot.targets.get(range.start_index..range.end_index) {
                debug!(worker_id = %worker_id, range = %range, "Folding completed range");
                keys.extend(targets.iter().map(|t| t.key.clone()));
            }
        }
        keys
    }

    fn remove_worker_files(&self) -> Result<usize> {
        let mut removed = 0;
        let files = self
            .layout
            .list_checkpoint_files()?
            .into_iter()
            .chain(self.layout.list_heartbeat_files()?);

        for (_, path) in files {
            if remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Shared
    // =========================================================================

    /// Snapshot first: an assignment must never index a snapshot that is not
    /// on disk yet.
    fn persist_partition(
        &mut self,
        snapshot: &TargetSnapshot,
        assignment: &WorkAssignment,
    ) -> Result<()> {
        self.layout.save_snapshot(snapshot)?;
        self.layout.save_assignment(assignment)?;
        self.layout.write_supervisor_pid(self.pid)?;
        self.install_assignment(assignment);
        Ok(())
    }

    fn spawn_all(&mut self, now: DateTime<Utc>) -> Vec<SpawnedWorker> {
        let ranges: Vec<_> = self.workers.values().map(|s| s.range).collect();
        let mut spawned = Vec::with_capacity(ranges.len());

        for range in ranges {
            match self.spawn_worker(range.worker_id, now) {
                Ok(pid) => spawned.push(SpawnedWorker {
                    worker_id: range.worker_id,
                    range,
                    pid: Some(pid),
                    error: None,
                }),
                Err(e) => {
                    warn!(worker_id = %range.worker_id, error = %e, "Failed to spawn worker");
                    spawned.push(SpawnedWorker {
                        worker_id: range.worker_id,
                        range,
                        pid: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        spawned
    }

    fn spawn_worker(&mut self, worker_id: WorkerId, now: DateTime<Utc>) -> Result<u32> {
        let Some(state) = self.workers.get_mut(&worker_id) else {
            return Err(FleetError::Process(format!(
                "worker {} is not in the current assignment",
                worker_id
            )));
        };

        match self.launcher.launch(&state.range) {
            Ok(process) => {
                let pid = process.pid();
                state.pid = Some(pid);
                state.status = WorkerStatus::Running;
                state.spawned_at = Some(now);
                state.last_exit_code = None;
                self.handles.insert(worker_id, process);
                Ok(pid)
            }
            Err(e) => {
                state.pid = None;
                state.status = WorkerStatus::Crashed;
                Err(e)
            }
        }
    }
}
