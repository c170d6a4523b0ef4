use chrono::{DateTime, Duration, Utc};

use crate::supervisor::state::WorkerState;

/// Bounded restart policy.
///
/// The budget is per run and never resets; the cooldown is measured from the
/// last restart whenever one has happened.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_restarts_per_worker: u32,
    pub restart_cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Allowed,
    CoolingDown { retry_in: Duration },
    BudgetExhausted,
}

impl RestartPolicy {
    pub fn evaluate(&self, state: &WorkerState, now: DateTime<Utc>) -> RestartDecision {
        if state.restart_count >= self.max_restarts_per_worker {
            return RestartDecision::BudgetExhausted;
        }

        if let Some(last) = state.last_restart {
            let elapsed = now - last;
            if elapsed < self.restart_cooldown {
                return RestartDecision::CoolingDown {
                    retry_in: self.restart_cooldown - elapsed,
                };
            }
        }

        RestartDecision::Allowed
    }
}
