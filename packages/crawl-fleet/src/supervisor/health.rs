//! Worker health classification.
//!
//! A live process handle is consulted first; otherwise the heartbeat file is
//! the source of truth, since it outlives a supervisor restart.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::coordination::{Heartbeat, HeartbeatStatus};

/// Age limits applied to heartbeats
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Older than this, the worker is eligible for replacement
    pub heartbeat_timeout: Duration,
    /// Older than this, the old process is force-killed first
    pub stale_kill_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerHealth {
    Healthy,
    Crashed {
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Stale {
        age_secs: i64,
        force_kill: bool,
    },
    Completed,
    Unknown {
        reason: String,
    },
}

impl WorkerHealth {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Crashed { .. } => "crashed",
            Self::Stale { .. } => "stale",
            Self::Completed => "completed",
            Self::Unknown { .. } => "unknown",
        }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown {
            reason: reason.into(),
        }
    }
}

/// Classify a process this supervisor saw exit.
pub fn classify_exit(code: i32) -> WorkerHealth {
    if code == 0 {
        WorkerHealth::Completed
    } else {
        WorkerHealth::Crashed {
            exit_code: Some(code),
            error: None,
        }
    }
}

/// Classify from the heartbeat file alone.
pub fn classify_heartbeat(
    heartbeat: Option<&Heartbeat>,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> WorkerHealth {
    let Some(heartbeat) = heartbeat else {
        return WorkerHealth::unknown("no heartbeat file");
    };

    match heartbeat.status {
        HeartbeatStatus::Completed => WorkerHealth::Completed,
        HeartbeatStatus::Failed => WorkerHealth::Crashed {
            exit_code: None,
            error: heartbeat.error.clone(),
        },
        HeartbeatStatus::Starting | HeartbeatStatus::Running => {
            classify_age(heartbeat.age(now), thresholds)
        }
    }
}

/// Classify purely by how long a worker has been silent.
pub fn classify_age(age: Duration, thresholds: &HealthThresholds) -> WorkerHealth {
    if age > thresholds.stale_kill_timeout {
        WorkerHealth::Stale {
            age_secs: age.num_seconds(),
            force_kill: true,
        }
    } else if age > thresholds.heartbeat_timeout {
        WorkerHealth::Stale {
            age_secs: age.num_seconds(),
            force_kill: false,
        }
    } else {
        WorkerHealth::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkerId;

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            heartbeat_timeout: Duration::seconds(120),
            stale_kill_timeout: Duration::seconds(300),
        }
    }

    fn heartbeat_aged(secs: i64, status: HeartbeatStatus, now: DateTime<Utc>) -> Heartbeat {
        let mut hb = Heartbeat::starting(WorkerId(0), 100, 10);
        hb.status = status;
        hb.last_heartbeat = now - Duration::seconds(secs);
        hb
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(classify_exit(0), WorkerHealth::Completed);
        assert_eq!(classify_exit(1).label(), "crashed");
        assert_eq!(classify_exit(130).label(), "crashed");
    }

    #[test]
    fn test_missing_heartbeat_is_unknown() {
        let health = classify_heartbeat(None, Utc::now(), &thresholds());
        assert_eq!(health.label(), "unknown");
    }

    #[test]
    fn test_terminal_status_wins_over_age() {
        let now = Utc::now();
        let done = heartbeat_aged(10_000, HeartbeatStatus::Completed, now);
        assert_eq!(classify_heartbeat(Some(&done), now, &thresholds()), WorkerHealth::Completed);

        let mut failed = heartbeat_aged(5, HeartbeatStatus::Failed, now);
        failed.error = Some("snapshot missing".into());
        assert_eq!(
            classify_heartbeat(Some(&failed), now, &thresholds()),
            WorkerHealth::Crashed {
                exit_code: None,
                error: Some("snapshot missing".into())
            }
        );
    }

    #[test]
    fn test_age_bands() {
        let now = Utc::now();
        let t = thresholds();

        let fresh = heartbeat_aged(30, HeartbeatStatus::Running, now);
        assert_eq!(classify_heartbeat(Some(&fresh), now, &t), WorkerHealth::Healthy);

        let at_limit = heartbeat_aged(120, HeartbeatStatus::Running, now);
        assert_eq!(classify_heartbeat(Some(&at_limit), now, &t), WorkerHealth::Healthy);

        let stale = heartbeat_aged(200, HeartbeatStatus::Starting, now);
        assert_eq!(
            classify_heartbeat(Some(&stale), now, &t),
            WorkerHealth::Stale {
                age_secs: 200,
                force_kill: false
            }
        );

        let dead = heartbeat_aged(301, HeartbeatStatus::Running, now);
        assert_eq!(
            classify_heartbeat(Some(&dead), now, &t),
            WorkerHealth::Stale {
                age_secs: 301,
                force_kill: true
            }
        );
    }
}
