use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::atomic::{atomic_write_json, read_json, remove_if_exists};
use crate::coordination::layout::StateLayout;
use crate::error::Result;

/// Supervisor-owned record of keys finished before the last repartition.
///
/// Rebalance cleanup deletes every checkpoint, so the keys they held are
/// folded in here first. A later rebalance unions this with the checkpoints
/// written since, which keeps repeated rebalances from reviving done work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedLedger {
    pub updated_at: Option<DateTime<Utc>>,
    pub keys: BTreeSet<String>,
}

impl CompletedLedger {
    /// A missing ledger is an empty one.
    pub fn load(layout: &StateLayout) -> Result<Self> {
        Ok(read_json(&layout.ledger_path())?.unwrap_or_default())
    }

    pub fn save(&self, layout: &StateLayout) -> Result<()> {
        atomic_write_json(&layout.ledger_path(), self)
    }

    pub fn clear(layout: &StateLayout) -> Result<bool> {
        remove_if_exists(&layout.ledger_path())
    }
}
