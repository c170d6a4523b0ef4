//! `fleet` - operator CLI for the crawl fleet.
//!
//! The same binary is what the supervisor re-executes for each worker
//! process (`fleet worker --worker-id N --start S --end E`).

mod cmd;
mod context;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Partition a crawl target list across supervised worker processes")]
struct Cli {
    /// Path to fleet.toml (defaults to ./fleet.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of styled text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the target list and spawn every worker
    Start,

    /// Run one health check, restarting crashed or stale workers
    Check,

    /// Show per-worker progress without changing anything
    Status,

    /// Stop every worker
    Stop,

    /// Stop workers, drop finished targets and repartition the rest
    Rebalance,

    /// Run health checks on an interval until every worker completes
    Monitor {
        /// Seconds between checks (overrides health.check_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Process one range of the target snapshot
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        worker_id: u32,
        #[arg(long)]
        start: usize,
        #[arg(long)]
        end: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Worker { .. }));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = AppContext::load(cli.config, cli.json)?;

    match cli.command {
        Commands::Start => cmd::start::run(&ctx).await?,
        Commands::Check => cmd::check::run(&ctx).await?,
        Commands::Status => cmd::status::run(&ctx)?,
        Commands::Stop => cmd::stop::run(&ctx).await?,
        Commands::Rebalance => cmd::rebalance::run(&ctx).await?,
        Commands::Monitor { interval } => cmd::monitor::run(&ctx, interval).await?,
        Commands::Worker {
            worker_id,
            start,
            end,
        } => return cmd::worker::run(&ctx, worker_id, start, end).await,
    }

    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so `--json` output on stdout stays parseable. Worker
/// stderr is appended to the worker's log file.
fn init_tracing(worker: bool) {
    let default_filter = if worker {
        "info,crawl_fleet=debug"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_target(worker).with_writer(std::io::stderr))
        .init();
}
