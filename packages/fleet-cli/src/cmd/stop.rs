use anyhow::{Context, Result};

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut supervisor = ctx.supervisor()?;
    let report = supervisor
        .stop_all()
        .await
        .context("Failed to stop workers")?;

    if ctx.json {
        return ctx.print_json(&report);
    }

    ctx.print_header("Stopping crawl fleet");
    if report.workers.is_empty() {
        ctx.print_info("No worker processes found");
        return Ok(());
    }
    super::print_stopped(&report.workers);
    ctx.print_success("Workers stopped; checkpoints kept for `fleet start` or `fleet rebalance`");
    Ok(())
}
