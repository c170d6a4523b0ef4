//! Fleet configuration.
//!
//! Loaded from a TOML file (every field has a default) and then overridden
//! from the environment:
//! - `CRAWL_FLEET_STATE_DIR` - state directory root
//! - `CRAWL_FLEET_WORKERS` - worker count
//! - `CRAWL_FLEET_TARGETS_FILE` - canonical target list file
//!
//! A `.env` file is honoured in development.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FleetError, Result};

/// Top-level configuration shared by the supervisor and its workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Root of the shared heartbeat/checkpoint directory
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Canonical target list consumed by the file target source
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,
    pub workers: WorkersConfig,
    pub health: HealthConfig,
    pub processor: ProcessorConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            targets_file: default_targets_file(),
            workers: WorkersConfig::default(),
            health: HealthConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".crawl-fleet")
}

fn default_targets_file() -> PathBuf {
    PathBuf::from("targets.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of worker processes (upper bound; small lists use fewer)
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Persist the checkpoint every N targets
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            checkpoint_interval: default_checkpoint_interval(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

fn default_worker_count() -> usize {
    5
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Heartbeat age after which a worker is replaceable
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Heartbeat age after which the old process is force-killed
    #[serde(default = "default_stale_kill_timeout_secs")]
    pub stale_kill_timeout_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_restarts_per_worker")]
    pub max_restarts_per_worker: u32,
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,
    /// Per-process wait between graceful and forced termination
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            stale_kill_timeout_secs: default_stale_kill_timeout_secs(),
            check_interval_secs: default_check_interval_secs(),
            max_restarts_per_worker: default_max_restarts_per_worker(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

fn default_heartbeat_timeout_secs() -> u64 {
    120
}

fn default_stale_kill_timeout_secs() -> u64 {
    300
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_max_restarts_per_worker() -> u32 {
    3
}

fn default_restart_cooldown_secs() -> u64 {
    60
}

fn default_stop_timeout_secs() -> u64 {
    10
}

/// External command run once per target.
///
/// `{key}` and `{url}` in any argument are replaced with the target's key
/// and URL (the key when the target has no URL).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub command: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl FleetConfig {
    /// Load from `path` if given, else from `fleet.toml` in the working
    /// directory when present, else defaults. Environment overrides apply
    /// in every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new("fleet.toml");
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| FleetError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| FleetError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = env::var("CRAWL_FLEET_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("CRAWL_FLEET_TARGETS_FILE") {
            self.targets_file = PathBuf::from(file);
        }
        if let Ok(count) = env::var("CRAWL_FLEET_WORKERS") {
            self.workers.count = count
                .parse()
                .map_err(|_| FleetError::Config("CRAWL_FLEET_WORKERS must be a number".into()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers.count == 0 {
            return Err(FleetError::Config("workers.count must be at least 1".into()));
        }
        if self.workers.checkpoint_interval == 0 {
            return Err(FleetError::Config(
                "workers.checkpoint_interval must be at least 1".into(),
            ));
        }
        if self.workers.heartbeat_interval_secs == 0 {
            return Err(FleetError::Config(
                "workers.heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.health.stale_kill_timeout_secs < self.health.heartbeat_timeout_secs {
            return Err(FleetError::Config(
                "health.stale_kill_timeout_secs must not be below heartbeat_timeout_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.workers.heartbeat_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.health.check_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.health.stop_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.health.heartbeat_timeout_secs as i64)
    }

    pub fn stale_kill_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.health.stale_kill_timeout_secs as i64)
    }

    pub fn restart_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.health.restart_cooldown_secs as i64)
    }
}
