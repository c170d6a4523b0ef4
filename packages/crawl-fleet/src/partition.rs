//! Deterministic partitioning of a target list into contiguous ranges.
//!
//! Targets are sorted by key so two independent fetches of the same
//! canonical source produce the same partition, which is what lets a
//! restarted supervisor (or worker) line up with existing checkpoints.

use chrono::Utc;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::types::{AssignmentKind, Target, TargetSnapshot, WorkAssignment, WorkRange, WorkerId};

/// Sort targets by key and drop duplicate keys (first occurrence wins).
pub fn sort_targets(mut targets: Vec<Target>) -> Vec<Target> {
    targets.sort_by(|a, b| a.key.cmp(&b.key));
    targets.dedup_by(|a, b| a.key == b.key);
    targets
}

/// Split `total` items into at most `workers` contiguous ranges of
/// `ceil(total / workers)` items each.
///
/// Emission stops once a range would start at or past `total`, so fewer
/// ranges than workers may come back. An empty list yields no ranges.
pub fn partition_ranges(total: usize, workers: usize) -> Result<Vec<WorkRange>> {
    if workers == 0 {
        return Err(FleetError::InvalidWorkerCount);
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let chunk = total.div_ceil(workers);
    let mut ranges = Vec::with_capacity(workers);

    for i in 0..workers {
        let start = i * chunk;
        if start >= total {
            break;
        }
        let end = ((i + 1) * chunk).min(total);
        ranges.push(WorkRange::new(WorkerId(i as u32), start, end));
    }

    debug!(total, workers, chunk, ranges = ranges.len(), "Partitioned targets");

    Ok(ranges)
}

/// Sort `targets` and partition them, returning the snapshot the
/// assignment indexes into alongside the assignment itself.
pub fn plan_assignment(
    targets: Vec<Target>,
    workers: usize,
    kind: AssignmentKind,
) -> Result<(TargetSnapshot, WorkAssignment)> {
    let sorted = sort_targets(targets);
    let ranges = partition_ranges(sorted.len(), workers.min(sorted.len()).max(1))?;

    let assignment = WorkAssignment {
        created_at: Utc::now(),
        total_targets: sorted.len(),
        kind,
        ranges,
        stopped_at: None,
    };

    Ok((TargetSnapshot::new(sorted), assignment))
}
