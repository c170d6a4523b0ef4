use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::types::Target;

// ============================================================================
// TARGET SOURCE: Canonical target list (fetch policy lives in the impl)
// ============================================================================

#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Fetch the full target list. May be called repeatedly.
    async fn fetch_targets(&self) -> Result<Vec<Target>>;
}

// ============================================================================
// TARGET PROCESSOR: Crawl/parse/store for a single target (black box)
// ============================================================================

/// What processing one target changed downstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
}

impl ItemOutcome {
    pub fn inserted(count: u64) -> Self {
        Self {
            inserted: count,
            updated: 0,
        }
    }

    pub fn updated(count: u64) -> Self {
        Self {
            inserted: 0,
            updated: count,
        }
    }
}

#[async_trait]
pub trait TargetProcessor: Send + Sync {
    /// Process one target. Errors are counted, never fatal to the batch.
    async fn process(&self, target: &Target) -> std::result::Result<ItemOutcome, ProcessError>;
}
