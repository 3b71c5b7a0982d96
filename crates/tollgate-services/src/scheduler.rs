//! Periodic billing driver
//!
//! Runs `process_batch` on a fixed interval until told to stop. A batch that
//! overruns the interval delays the next tick instead of stacking ticks.

use crate::engine::RealtimeBillingEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct BillingScheduler {
    engine: Arc<RealtimeBillingEngine>,
    interval: Duration,
}

impl BillingScheduler {
    pub fn new(engine: Arc<RealtimeBillingEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Tick until `shutdown` turns true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Billing scheduler started, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Billing scheduler stopped");
    }

    async fn tick(&self) {
        match self.engine.process_batch().await {
            Ok(report) if report.processed == 0 => debug!("No calls in progress"),
            Ok(report) => {
                if report.failed > 0 || report.termination_failed > 0 {
                    warn!(
                        processed = report.processed,
                        terminated = report.terminated,
                        termination_failed = report.termination_failed,
                        failed = report.failed,
                        "Billing batch finished with failures in {}ms",
                        report.duration_ms
                    );
                } else {
                    info!(
                        processed = report.processed,
                        untracked = report.untracked,
                        terminated = report.terminated,
                        "Billing batch finished in {}ms",
                        report.duration_ms
                    );
                }
            }
            Err(e) => error!("Billing batch failed: {}", e),
        }
    }
}
