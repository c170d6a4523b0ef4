//! Subcommand implementations.
//!
//! Each command calls one supervisor operation and renders its report,
//! either as styled text or, with `--json`, as the report itself.

pub mod check;
pub mod monitor;
pub mod rebalance;
pub mod start;
pub mod status;
pub mod stop;
pub mod worker;

use console::{style, StyledObject};

use crawl_fleet::supervisor::{SpawnedWorker, StopOutcome, StoppedWorker, WorkerHealth};

pub(crate) fn health_label(health: &WorkerHealth) -> StyledObject<&'static str> {
    let label = style(health.label());
    match health {
        WorkerHealth::Healthy => label.green(),
        WorkerHealth::Completed => label.cyan(),
        WorkerHealth::Crashed { .. } => label.red().bold(),
        WorkerHealth::Stale { .. } => label.yellow(),
        WorkerHealth::Unknown { .. } => label.dim(),
    }
}

/// Extra context shown after the label, if any.
pub(crate) fn health_detail(health: &WorkerHealth) -> Option<String> {
    match health {
        WorkerHealth::Crashed { exit_code, error } => match (exit_code, error) {
            (_, Some(error)) => Some(error.clone()),
            (Some(code), None) => Some(format!("exit code {}", code)),
            (None, None) => None,
        },
        WorkerHealth::Stale {
            age_secs,
            force_kill,
        } => Some(format!(
            "no heartbeat for {}s{}",
            age_secs,
            if *force_kill { ", force kill" } else { "" }
        )),
        WorkerHealth::Unknown { reason } => Some(reason.clone()),
        WorkerHealth::Healthy | WorkerHealth::Completed => None,
    }
}

pub(crate) fn print_spawned(workers: &[SpawnedWorker]) {
    for worker in workers {
        let range = format!("{:<12}", worker.range.to_string());
        match (worker.pid, &worker.error) {
            (Some(pid), _) => println!(
                "  {} worker {:<3} {} pid {}",
                style("✓").green(),
                worker.worker_id,
                range,
                pid
            ),
            (None, error) => println!(
                "  {} worker {:<3} {} {}",
                style("✗").red(),
                worker.worker_id,
                range,
                style(error.as_deref().unwrap_or("spawn failed")).red()
            ),
        }
    }
}

pub(crate) fn print_stopped(workers: &[StoppedWorker]) {
    for worker in workers {
        let outcome = match &worker.outcome {
            StopOutcome::AlreadyExited => style("already exited".to_string()).dim(),
            StopOutcome::Terminated => style("terminated".to_string()).green(),
            StopOutcome::Killed => style("force killed".to_string()).yellow(),
            StopOutcome::Failed { error } => style(format!("failed: {}", error)).red(),
        };
        println!(
            "  worker {:<3} pid {:<8} {}",
            worker.worker_id, worker.pid, outcome
        );
    }
}
