use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordination::{Checkpoint, CheckpointCounters, Heartbeat, HeartbeatStatus, StateLayout};
use crate::error::{FleetError, Result};
use crate::traits::{TargetProcessor, TargetSource};
use crate::types::{Target, WorkRange, WorkerId};
use crate::worker::ticker::HeartbeatTicker;

/// Exit code for a worker that exhausted its range
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code for an unhandled worker failure
pub const EXIT_FAILED: i32 = 1;
/// Exit code for a worker stopped early by a shutdown signal
pub const EXIT_INTERRUPTED: i32 = 130;

/// Per-worker runtime settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub range: WorkRange,
    pub checkpoint_interval: usize,
    pub heartbeat_interval: Duration,
}

impl WorkerSettings {
    pub fn worker_id(&self) -> WorkerId {
        self.range.worker_id
    }
}

/// How a worker run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every index in the range was visited
    Completed {
        counters: CheckpointCounters,
        fully_succeeded: bool,
    },
    /// Stopped between targets; `next_index` is where a restart resumes
    Interrupted {
        next_index: usize,
        counters: CheckpointCounters,
    },
}

impl WorkerExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { .. } => EXIT_COMPLETED,
            Self::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }
}

enum RangeOutcome {
    Exhausted { all_completed: bool },
    Stopped { next_index: usize },
}

/// Processes one contiguous range of a frozen target list.
///
/// Resumes from an existing checkpoint, skipping keys already completed.
/// The checkpoint is persisted every `checkpoint_interval` targets, so a
/// crash redoes at most that many.
pub struct WorkerRunner {
    layout: StateLayout,
    settings: WorkerSettings,
    pid: u32,
}

impl WorkerRunner {
    pub fn new(layout: StateLayout, settings: WorkerSettings) -> Self {
        Self {
            layout,
            settings,
            pid: std::process::id(),
        }
    }

    /// Override the pid recorded in heartbeats.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub async fn run(
        &self,
        source: &dyn TargetSource,
        processor: &dyn TargetProcessor,
        shutdown: CancellationToken,
    ) -> Result<WorkerExit> {
        let worker_id = self.settings.worker_id();
        let range = self.settings.range;

        self.layout.ensure_dirs()?;

        let heartbeat = Arc::new(Mutex::new(Heartbeat::starting(
            worker_id,
            self.pid,
            range.len(),
        )));
        heartbeat.lock().await.save(&self.layout)?;

        info!(
            worker_id = %worker_id,
            pid = self.pid,
            start = range.start_index,
            end = range.end_index,
            "Worker starting"
        );

        let mut checkpoint = match Checkpoint::load(&self.layout, worker_id) {
            Ok(Some(existing)) => {
                info!(
                    worker_id = %worker_id,
                    completed = existing.completed_target_keys.len(),
                    current_index = existing.current_index,
                    "Resuming from checkpoint"
                );
                existing
            }
            Ok(None) => Checkpoint::new(worker_id),
            Err(e) => return self.fail(&heartbeat, None, e).await,
        };

        let ticker = HeartbeatTicker::spawn(
            self.layout.clone(),
            heartbeat.clone(),
            self.settings.heartbeat_interval,
        );

        let result = self
            .process_range(source, processor, &mut checkpoint, &heartbeat, &shutdown)
            .await;

        ticker.stop().await;

        match result {
            Ok(RangeOutcome::Exhausted { all_completed }) => {
                self.complete(checkpoint, &heartbeat, all_completed).await
            }
            Ok(RangeOutcome::Stopped { next_index }) => {
                self.interrupt(checkpoint, &heartbeat, next_index).await
            }
            Err(e) => self.fail(&heartbeat, Some(&checkpoint), e).await,
        }
    }

    async fn process_range(
        &self,
        source: &dyn TargetSource,
        processor: &dyn TargetProcessor,
        checkpoint: &mut Checkpoint,
        heartbeat: &Mutex<Heartbeat>,
        shutdown: &CancellationToken,
    ) -> Result<RangeOutcome> {
        let worker_id = self.settings.worker_id();
        let range = self.settings.range;
        let targets = source.fetch_targets().await?;

        if range.start_index > range.end_index || range.end_index > targets.len() {
            return Err(FleetError::RangeOutOfBounds {
                start: range.start_index,
                end: range.end_index,
                total: targets.len(),
            });
        }

        heartbeat.lock().await.status = HeartbeatStatus::Running;

        let interval = self.settings.checkpoint_interval.max(1);
        let mut since_save = 0usize;

        for index in range.start_index..range.end_index {
            if shutdown.is_cancelled() {
                return Ok(RangeOutcome::Stopped { next_index: index });
            }

            let target: &Target = &targets[index];
            if checkpoint.is_completed(&target.key) {
                debug!(worker_id = %worker_id, key = %target.key, "Already completed, skipping");
                self.mark_position(heartbeat, index + 1, None).await;
                continue;
            }

            // In flight: not yet counted as processed
            self.mark_position(heartbeat, index, Some(&target.key)).await;

            match processor.process(target).await {
                Ok(outcome) => {
                    checkpoint.record_success(index, &target.key, outcome);
                    debug!(
                        worker_id = %worker_id,
                        key = %target.key,
                        inserted = outcome.inserted,
                        updated = outcome.updated,
                        "Target processed"
                    );
                }
                Err(e) => {
                    checkpoint.record_error(index, &target.key);
                    warn!(worker_id = %worker_id, key = %target.key, error = %e, "Target failed");
                }
            }
            heartbeat.lock().await.targets_processed = index + 1 - range.start_index;

            since_save += 1;
            if since_save >= interval {
                checkpoint.save(&self.layout)?;
                since_save = 0;
                debug!(
                    worker_id = %worker_id,
                    completed = checkpoint.completed_target_keys.len(),
                    "Checkpoint saved"
                );
            }
        }

        let all_completed = targets[range.start_index..range.end_index]
            .iter()
            .all(|t| checkpoint.is_completed(&t.key));
        if !all_completed {
            info!(
                worker_id = %worker_id,
                errors = checkpoint.counters.errors,
                "Range exhausted with failed targets; keeping checkpoint"
            );
        }

        Ok(RangeOutcome::Exhausted { all_completed })
    }

    /// `done_through` is the first index not yet processed.
    async fn mark_position(
        &self,
        heartbeat: &Mutex<Heartbeat>,
        done_through: usize,
        current: Option<&str>,
    ) {
        let mut hb = heartbeat.lock().await;
        hb.current_target = current.map(str::to_string);
        hb.targets_processed = done_through - self.settings.range.start_index;
    }

    async fn complete(
        &self,
        checkpoint: Checkpoint,
        heartbeat: &Mutex<Heartbeat>,
        fully_succeeded: bool,
    ) -> Result<WorkerExit> {
        let worker_id = self.settings.worker_id();
        checkpoint.save(&self.layout)?;

        {
            let mut hb = heartbeat.lock().await;
            hb.status = HeartbeatStatus::Completed;
            hb.current_target = None;
            hb.targets_processed = hb.targets_total;
            hb.last_heartbeat = Utc::now();
            hb.save(&self.layout)?;
        }

        if fully_succeeded {
            Checkpoint::delete(&self.layout, worker_id)?;
        }

        info!(
            worker_id = %worker_id,
            processed = checkpoint.counters.processed,
            inserted = checkpoint.counters.inserted,
            updated = checkpoint.counters.updated,
            errors = checkpoint.counters.errors,
            fully_succeeded,
            "Worker completed range"
        );

        Ok(WorkerExit::Completed {
            counters: checkpoint.counters,
            fully_succeeded,
        })
    }

    async fn interrupt(
        &self,
        mut checkpoint: Checkpoint,
        heartbeat: &Mutex<Heartbeat>,
        next_index: usize,
    ) -> Result<WorkerExit> {
        let worker_id = self.settings.worker_id();
        checkpoint.current_index = next_index;
        checkpoint.updated_at = Utc::now();
        checkpoint.save(&self.layout)?;

        {
            // Status stays running so a restart resumes from the checkpoint
            let mut hb = heartbeat.lock().await;
            hb.current_target = None;
            hb.last_heartbeat = Utc::now();
            hb.save(&self.layout)?;
        }

        info!(worker_id = %worker_id, next_index, "Worker stopped early");

        Ok(WorkerExit::Interrupted {
            next_index,
            counters: checkpoint.counters,
        })
    }

    async fn fail(
        &self,
        heartbeat: &Mutex<Heartbeat>,
        checkpoint: Option<&Checkpoint>,
        err: FleetError,
    ) -> Result<WorkerExit> {
        let worker_id = self.settings.worker_id();
        error!(worker_id = %worker_id, error = %err, "Worker failed");

        if let Some(checkpoint) = checkpoint {
            if let Err(e) = checkpoint.save(&self.layout) {
                warn!(worker_id = %worker_id, error = %e, "Failed to persist checkpoint on failure");
            }
        }

        let mut hb = heartbeat.lock().await;
        hb.status = HeartbeatStatus::Failed;
        hb.error = Some(err.to_string());
        hb.last_heartbeat = Utc::now();
        if let Err(e) = hb.save(&self.layout) {
            warn!(worker_id = %worker_id, error = %e, "Failed to write failed heartbeat");
        }

        Err(err)
    }
}
