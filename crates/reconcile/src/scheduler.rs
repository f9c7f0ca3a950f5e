use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info};

use crate::Reconciler;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    /// Cycles that could not list records and were followed by backoff.
    pub failed_cycles: u64,
}

/// Runs reconcile cycles strictly one after another.
pub struct SchedulerLoop {
    reconciler: Reconciler,
    interval: Duration,
    backoff: Duration,
}

impl SchedulerLoop {
    pub fn new(reconciler: Reconciler, interval: Duration, backoff: Duration) -> Self {
        Self { reconciler, interval, backoff }
    }

    /// Loop until `shutdown` turns true. The flag is honoured only between
    /// cycles, never while one is running. A dropped sender means run forever.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> LoopSummary {
        let mut summary = LoopSummary::default();
        info!(interval_secs = self.interval.as_secs(), backoff_secs = self.backoff.as_secs(), "scheduler loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            summary.cycles += 1;
            let delay = match self.reconciler.run_cycle().await {
                Ok(_) => self.interval,
                Err(e) => {
                    summary.failed_cycles += 1;
                    counter!("ethereal_backoffs_total", 1u64);
                    error!(error = %e, backoff_secs = self.backoff.as_secs(), "cycle failed; backing off");
                    self.backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                Ok(_) = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        info!(cycles = summary.cycles, failed = summary.failed_cycles, "scheduler loop stopped");
        summary
    }
}
