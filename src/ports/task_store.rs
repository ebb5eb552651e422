//! TaskStore port - durable queue behind the scheduler.
//!
//! Delivery is at-least-once: a task is leased to one worker at a time by
//! `claim_next`, and a lease that runs out (worker crash) is handed back by
//! `reap_stale`.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::{DomainError, TaskId, Timestamp};
use crate::domain::jobs::{QueueClass, Task};

/// Outcome of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Enqueued(TaskId),
    /// A task with the same dedupe key already exists.
    Duplicate,
}

/// What one `reap_stale` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub requeued: u64,
    pub failed: u64,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.failed == 0
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a pending task. Unique on `dedupe_key` when one is set.
    async fn enqueue(&self, task: &Task) -> Result<EnqueueResult, DomainError>;

    /// Leases the oldest ready task of `class` (run_at <= now), marking it
    /// running until `now + lease` and incrementing its attempt count.
    ///
    /// Concurrent callers never receive the same task.
    async fn claim_next(
        &self,
        class: QueueClass,
        now: Timestamp,
        lease: Duration,
    ) -> Result<Option<Task>, DomainError>;

    async fn complete(&self, id: &TaskId, now: Timestamp) -> Result<(), DomainError>;

    /// Returns a running task to pending, eligible again at `run_at`.
    async fn retry(
        &self,
        id: &TaskId,
        run_at: Timestamp,
        error: &str,
    ) -> Result<(), DomainError>;

    /// Terminal failure; the task is kept for inspection.
    async fn fail(&self, id: &TaskId, error: &str, now: Timestamp) -> Result<(), DomainError>;

    /// Settles running tasks whose lease expired before `now`: back to
    /// pending while attempts remain, terminal-failed once they are used up.
    async fn reap_stale(&self, now: Timestamp) -> Result<ReapReport, DomainError>;

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, DomainError>;

    /// Terminal-failed tasks, most recent first.
    async fn list_failed(&self, limit: u32) -> Result<Vec<Task>, DomainError>;
}
