//! Long-running supervision loop.
//!
//! Restart budgets and cooldowns live in the supervisor's memory, so this is
//! the command that enforces them across cycles.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crawl_fleet::worker::listen_for_shutdown;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext, interval: Option<u64>) -> Result<()> {
    let period = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.check_interval())
        .max(Duration::from_secs(1));

    ctx.require_processor()?;
    let mut supervisor = ctx.supervisor()?;
    let shutdown = CancellationToken::new();
    let listener = listen_for_shutdown(shutdown.clone());

    info!(interval_secs = period.as_secs(), "Monitoring crawl fleet");
    let mut ticker = tokio::time::interval(period);

    let outcome = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                ctx.print_info("Monitor stopped; workers keep running");
                break Ok(());
            }
            _ = ticker.tick() => {
                let report = match supervisor.check_once().await.context("Health check failed") {
                    Ok(report) => report,
                    Err(e) => break Err(e),
                };
                super::check::render(ctx, &report)?;
                if report.all_completed() {
                    break Ok(());
                }
            }
        }
    };

    shutdown.cancel();
    let _ = listener.await;
    outcome
}
