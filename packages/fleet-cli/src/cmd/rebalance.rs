use anyhow::{Context, Result};
use console::style;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    ctx.require_processor()?;
    let mut supervisor = ctx.supervisor()?;
    let report = supervisor
        .rebalance()
        .await
        .context("Rebalance failed")?;

    if ctx.json {
        return ctx.print_json(&report);
    }

    ctx.print_header("Rebalancing crawl fleet");
    if !report.stopped.is_empty() {
        super::print_stopped(&report.stopped);
    }

    println!(
        "  {} canonical targets, {} done ({} newly checkpointed), {} remaining",
        report.canonical_total,
        report.completed_total,
        report.checkpointed_keys,
        style(report.remaining_total).bold()
    );

    if report.is_finished() {
        ctx.print_success("Every target is done; no workers spawned");
        return Ok(());
    }

    super::print_spawned(&report.workers);
    Ok(())
}
