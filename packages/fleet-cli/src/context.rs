//! Application context with shared state and output helpers

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use crawl_fleet::coordination::StateLayout;
use crawl_fleet::processor::CommandProcessor;
use crawl_fleet::sources::FileTargetSource;
use crawl_fleet::supervisor::{CommandLauncher, SystemProcessControl};
use crawl_fleet::{FleetConfig, Supervisor};

/// Application context passed to all commands
pub struct AppContext {
    pub config: FleetConfig,
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>, json: bool) -> Result<Self> {
        let config = FleetConfig::load(config_path.as_deref()).context("Failed to load config")?;
        Ok(Self {
            config,
            config_path,
            json,
        })
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&self.config.state_dir)
    }

    /// Commands that spawn workers call this first, so a missing crawl
    /// command fails here rather than in every worker.
    pub fn require_processor(&self) -> Result<CommandProcessor> {
        CommandProcessor::from_config(&self.config.processor)
            .context("processor.command must name the crawl command")
    }

    /// Supervisor that spawns workers by re-executing this binary.
    pub fn supervisor(&self) -> Result<Supervisor> {
        let mut launcher =
            CommandLauncher::current_exe(self.layout()).context("Failed to locate fleet binary")?;
        // Workers inherit the working directory and environment, so only an
        // explicit config path needs forwarding
        if let Some(path) = &self.config_path {
            launcher = launcher.args(["--config".to_string(), path.to_string_lossy().into_owned()]);
        }

        Ok(Supervisor::new(
            &self.config,
            Box::new(FileTargetSource::new(self.config.targets_file.clone())),
            Box::new(launcher),
            Box::new(SystemProcessControl),
        ))
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
        println!("{}", json);
        Ok(())
    }

    pub fn print_header(&self, msg: &str) {
        if !self.json {
            println!();
            println!("{}", style(msg).bold());
        }
    }

    pub fn print_success(&self, msg: &str) {
        if !self.json {
            println!("{}", style(msg).green());
        }
    }

    pub fn print_warning(&self, msg: &str) {
        if !self.json {
            println!("{}", style(msg).yellow());
        }
    }

    pub fn print_info(&self, msg: &str) {
        if !self.json {
            println!("{}", style(msg).cyan());
        }
    }
}
