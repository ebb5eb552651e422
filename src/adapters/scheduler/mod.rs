//! Scheduler adapter - runs the durable task queue.
//!
//! - `HandlerRegistry` - task type to `TaskHandler`
//! - `WorkerPool` - weighted claims, per-task timeout, retry with backoff
//! - `RecurringScheduler` - slot-deduplicated recurring fires
//! - `StaleTaskReaper` - returns expired leases to pending

mod reaper;
mod recurring;
mod registry;
mod worker;

pub use reaper::StaleTaskReaper;
pub use recurring::RecurringScheduler;
pub use registry::HandlerRegistry;
pub use worker::{TaskOutcome, WorkerPool, WorkerPoolConfig};

use std::sync::Arc;

use tokio::sync::watch;

/// The three scheduler loops, run together until shutdown.
pub struct Scheduler {
    pub workers: Arc<WorkerPool>,
    pub recurring: Arc<RecurringScheduler>,
    pub reaper: Arc<StaleTaskReaper>,
}

impl Scheduler {
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tokio::join!(
            self.workers.run(shutdown.clone()),
            self.recurring.run(shutdown.clone()),
            self.reaper.run(shutdown),
        );
    }
}
