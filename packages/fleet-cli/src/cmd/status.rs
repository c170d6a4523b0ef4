use anyhow::{Context, Result};
use chrono::Utc;
use console::style;

use crate::context::AppContext;

/// Read-only: never signals or spawns anything.
pub fn run(ctx: &AppContext) -> Result<()> {
    let supervisor = ctx.supervisor()?;
    let report = supervisor.get_status().context("Failed to read fleet status")?;

    if ctx.json {
        return ctx.print_json(&report);
    }

    ctx.print_header("Crawl fleet status");

    let Some(assignment) = &report.assignment else {
        ctx.print_warning("No assignment found; run `fleet start` first");
        return Ok(());
    };

    let supervisor_pid = report
        .supervisor_pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "unknown".into());
    println!(
        "  {:?} assignment created {} ago by supervisor pid {}",
        assignment.kind,
        format_age((Utc::now() - assignment.created_at).num_seconds()),
        supervisor_pid
    );
    println!(
        "  {} of {} targets processed ({:.1}%)",
        style(report.processed()).bold(),
        assignment.total_targets,
        report.progress() * 100.0
    );
    if report.previously_completed > 0 {
        println!(
            "  {} more finished before the last rebalance",
            report.previously_completed
        );
    }
    println!();

    for entry in &report.workers {
        let age = entry
            .heartbeat_age_secs
            .map(format_age)
            .unwrap_or_else(|| "-".into());
        println!(
            "  worker {:<3} {:<12} {:<10} {:>5}/{:<5} heartbeat {:<6} {}",
            entry.worker_id,
            entry.range.to_string(),
            super::health_label(&entry.health),
            entry.targets_processed,
            entry.targets_total,
            age,
            style(entry.current_target.as_deref().unwrap_or("")).dim()
        );
        if let Some(detail) = super::health_detail(&entry.health) {
            println!("    {}", style(detail).dim());
        }
    }
    Ok(())
}

fn format_age(secs: i64) -> String {
    match secs {
        s if s < 60 => format!("{}s", s.max(0)),
        s if s < 3600 => format!("{}m", s / 60),
        s => format!("{}h{}m", s / 3600, (s % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(-2), "0s");
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(185), "3m");
        assert_eq!(format_age(3725), "1h2m");
    }
}
