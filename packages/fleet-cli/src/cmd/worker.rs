use anyhow::Result;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crawl_fleet::sources::SnapshotTargetSource;
use crawl_fleet::worker::{listen_for_shutdown, EXIT_FAILED};
use crawl_fleet::{WorkRange, WorkerId, WorkerRunner, WorkerSettings};

use crate::context::AppContext;

/// Process `[start, end)` of the snapshot and exit with the worker's code
/// (0 completed, 130 interrupted, 1 failed).
pub async fn run(ctx: &AppContext, worker_id: u32, start: usize, end: usize) -> Result<ExitCode> {
    let processor = ctx.require_processor()?;

    let layout = ctx.layout();
    let settings = WorkerSettings {
        range: WorkRange::new(WorkerId(worker_id), start, end),
        checkpoint_interval: ctx.config.workers.checkpoint_interval,
        heartbeat_interval: ctx.config.heartbeat_interval(),
    };

    let shutdown = CancellationToken::new();
    let listener = listen_for_shutdown(shutdown.clone());
    let source = SnapshotTargetSource::new(layout.clone());

    let result = WorkerRunner::new(layout, settings)
        .run(&source, &processor, shutdown.clone())
        .instrument(tracing::info_span!("worker", worker_id))
        .await;

    shutdown.cancel();
    let _ = listener.await;

    // The runner has already logged the error and written a failed heartbeat
    let code = match result {
        Ok(exit) => exit.exit_code(),
        Err(_) => EXIT_FAILED,
    };
    Ok(ExitCode::from(code as u8))
}
