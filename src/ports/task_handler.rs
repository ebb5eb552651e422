//! TaskHandler port - executes one kind of scheduled task.
//!
//! Delivery is at-least-once: a worker that crashes after the handler
//! finished but before the task was acknowledged causes a second run.
//! Implementations must be idempotent.

use async_trait::async_trait;

use crate::domain::jobs::{Task, TaskError};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}
