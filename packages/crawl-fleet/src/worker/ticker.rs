//! Heartbeat ticker.
//!
//! Runs on its own task and timer so a slow target never starves liveness
//! signalling.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coordination::{Heartbeat, StateLayout};

/// Cancellable periodic heartbeat writer
pub struct HeartbeatTicker {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatTicker {
    /// Start writing `heartbeat` every `interval`, beginning immediately.
    pub fn spawn(layout: StateLayout, heartbeat: Arc<Mutex<Heartbeat>>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = {
                            let mut hb = heartbeat.lock().await;
                            hb.last_heartbeat = Utc::now();
                            hb.clone()
                        };
                        match snapshot.save(&layout) {
                            Ok(()) => debug!(
                                worker_id = %snapshot.worker_id,
                                processed = snapshot.targets_processed,
                                "Heartbeat written"
                            ),
                            Err(e) => warn!(
                                worker_id = %snapshot.worker_id,
                                error = %e,
                                "Failed to write heartbeat"
                            ),
                        }
                    }
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for any in-flight write to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Heartbeat ticker task ended abnormally");
            }
        }
    }
}

impl Drop for HeartbeatTicker {
    // Covers a worker future dropped mid-run
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkerId;

    #[tokio::test]
    async fn test_ticker_refreshes_heartbeat_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path());
        layout.ensure_dirs().unwrap();

        let mut initial = Heartbeat::starting(WorkerId(0), 1, 5);
        initial.last_heartbeat -= chrono::Duration::seconds(60);
        let started = initial.last_heartbeat;
        let heartbeat = Arc::new(Mutex::new(initial));

        let ticker = HeartbeatTicker::spawn(layout.clone(), heartbeat, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        ticker.stop().await;

        let written = Heartbeat::load(&layout, WorkerId(0)).unwrap().unwrap();
        assert!(written.last_heartbeat > started);

        // No writes after stop
        std::fs::remove_file(layout.heartbeat_path(WorkerId(0))).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(Heartbeat::load(&layout, WorkerId(0)).unwrap().is_none());
    }
}
