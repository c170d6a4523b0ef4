use anyhow::{Context, Result};
use console::style;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    ctx.require_processor()?;
    let mut supervisor = ctx.supervisor()?;
    let report = supervisor
        .start_all()
        .await
        .context("Failed to start workers")?;

    if ctx.json {
        return ctx.print_json(&report);
    }

    ctx.print_header("Starting crawl fleet");
    if !report.stopped.is_empty() {
        ctx.print_warning("Stopped unresponsive workers from a previous run:");
        super::print_stopped(&report.stopped);
    }
    if report.nothing_to_do() {
        ctx.print_warning("Target list is empty; nothing to crawl");
        return Ok(());
    }

    println!(
        "  {} targets across {} workers",
        style(report.total_targets).bold(),
        report.workers.len()
    );
    super::print_spawned(&report.workers);

    let failed = report.workers.iter().filter(|w| w.pid.is_none()).count();
    if failed > 0 {
        ctx.print_warning(&format!(
            "{} workers failed to spawn; `fleet check` will retry them",
            failed
        ));
    } else {
        ctx.print_info("Run `fleet monitor` to supervise until the crawl completes");
    }
    Ok(())
}
