//! Reference target sources.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::coordination::StateLayout;
use crate::error::{FleetError, Result};
use crate::traits::TargetSource;
use crate::types::Target;

/// Reads the canonical list from a local file.
///
/// Accepted formats:
/// - a JSON array of targets (`{"key": .., "url": ..}`) or of plain keys
/// - newline-delimited keys, with blank lines and `#` comments ignored
pub struct FileTargetSource {
    path: PathBuf,
}

impl FileTargetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Key(String),
    Full(Target),
}

impl From<TargetEntry> for Target {
    fn from(entry: TargetEntry) -> Self {
        match entry {
            TargetEntry::Key(key) => Target::new(key),
            TargetEntry::Full(target) => target,
        }
    }
}

/// Parse a target list in any of the formats [`FileTargetSource`] accepts.
pub fn parse_targets(content: &str, origin: &Path) -> Result<Vec<Target>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let entries: Vec<TargetEntry> =
            serde_json::from_str(trimmed).map_err(|e| FleetError::json(origin, e))?;
        return Ok(entries.into_iter().map(Target::from).collect());
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Target::new)
        .collect())
}

#[async_trait]
impl TargetSource for FileTargetSource {
    async fn fetch_targets(&self) -> Result<Vec<Target>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FleetError::io(&self.path, e))?;
        let targets = parse_targets(&content, &self.path)?;
        tracing::debug!(path = %self.path.display(), count = targets.len(), "Loaded targets from file");
        Ok(targets)
    }
}

/// Reads the frozen snapshot the current assignment was computed over.
///
/// Workers use this instead of the canonical source so their index ranges
/// always refer to the list the supervisor actually partitioned.
pub struct SnapshotTargetSource {
    layout: StateLayout,
}

impl SnapshotTargetSource {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl TargetSource for SnapshotTargetSource {
    async fn fetch_targets(&self) -> Result<Vec<Target>> {
        let snapshot = self.layout.load_snapshot()?.ok_or_else(|| {
            FleetError::Config(format!(
                "target snapshot {} not found",
                self.layout.snapshot_path().display()
            ))
        })?;
        Ok(snapshot.targets)
    }
}

/// Fixed in-memory target list
pub struct StaticTargetSource {
    targets: Vec<Target>,
}

impl StaticTargetSource {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetSource for StaticTargetSource {
    async fn fetch_targets(&self) -> Result<Vec<Target>> {
        Ok(self.targets.clone())
    }
}
