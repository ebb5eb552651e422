//! StaleTaskReaper - hands expired leases back to the queue.
//!
//! A lease that expires on the task's last attempt fails the task instead,
//! so a handler that keeps killing its worker ends in the dead-letter list.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{ReapReport, TaskStore};

pub struct StaleTaskReaper {
    store: Arc<dyn TaskStore>,
    interval: Duration,
}

impl StaleTaskReaper {
    pub fn new(store: Arc<dyn TaskStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn reap_once(&self, now: Timestamp) -> Result<ReapReport, DomainError> {
        let report = self.store.reap_stale(now).await?;
        if report.requeued > 0 {
            tracing::warn!(requeued = report.requeued, "Returned tasks with expired leases to the queue");
        }
        if report.failed > 0 {
            tracing::error!(
                failed = report.failed,
                "Tasks lost their lease on the final attempt and were failed"
            );
        }
        Ok(report)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.reap_once(Timestamp::now()).await {
                        tracing::error!(error = %e, "Stale task reaper failed");
                    }
                }
            }
        }
    }
}
