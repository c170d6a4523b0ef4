use anyhow::{Context, Result};
use console::style;

use crawl_fleet::supervisor::{HealthReport, SupervisorAction};

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    ctx.require_processor()?;
    let mut supervisor = ctx.supervisor()?;
    let report = supervisor
        .check_once()
        .await
        .context("Health check failed")?;
    render(ctx, &report)
}

/// Shared with `monitor`, which renders one of these per cycle.
pub fn render(ctx: &AppContext, report: &HealthReport) -> Result<()> {
    if ctx.json {
        return ctx.print_json(report);
    }

    ctx.print_header(&format!(
        "Health check at {}",
        report.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for entry in &report.workers {
        let pid = entry
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".into());
        let mut line = format!(
            "  worker {:<3} {:<12} pid {:<8} {}",
            entry.worker_id,
            entry.range.to_string(),
            pid,
            super::health_label(&entry.health)
        );
        if let Some(detail) = super::health_detail(&entry.health) {
            line.push_str(&format!(" {}", style(format!("({})", detail)).dim()));
        }
        if entry.restart_count > 0 {
            line.push_str(&format!(" restarts: {}", entry.restart_count));
        }
        println!("{}", line);
    }

    for action in &report.actions {
        println!("  {}", describe(action));
    }

    let unresolved = report.unresolved().count();
    if unresolved > 0 {
        ctx.print_warning(&format!("{} workers need attention", unresolved));
    } else if report.all_completed() {
        ctx.print_success("All workers completed");
    }
    Ok(())
}

fn describe(action: &SupervisorAction) -> String {
    match action {
        SupervisorAction::Restarted {
            worker_id,
            pid,
            restart_count,
        } => format!(
            "{} restarted worker {} as pid {} (restart #{})",
            style("↻").cyan(),
            worker_id,
            pid,
            restart_count
        ),
        SupervisorAction::Killed {
            worker_id,
            pid,
            forced,
        } => format!(
            "{} {} stale worker {} (pid {})",
            style("✗").yellow(),
            if *forced { "force killed" } else { "stopped" },
            worker_id,
            pid
        ),
        SupervisorAction::RestartDeferred {
            worker_id,
            retry_in_secs,
        } => format!(
            "{} worker {} restart cooling down, retry in {}s",
            style("…").dim(),
            worker_id,
            retry_in_secs
        ),
        SupervisorAction::RestartBudgetExhausted {
            worker_id,
            restart_count,
        } => format!(
            "{} worker {} gave up after {} restarts",
            style("!").red().bold(),
            worker_id,
            restart_count
        ),
        SupervisorAction::SpawnFailed { worker_id, error } => format!(
            "{} worker {} failed to spawn: {}",
            style("!").red().bold(),
            worker_id,
            error
        ),
        SupervisorAction::HeartbeatUnreadable { worker_id, error } => format!(
            "{} worker {} heartbeat unreadable: {}",
            style("!").red().bold(),
            worker_id,
            error
        ),
    }
}
