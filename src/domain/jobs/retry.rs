//! Retry policy for failed tasks.

use thiserror::Error;

use crate::domain::foundation::{DomainError, Timestamp};

use super::Task;

/// Upper bound on a single backoff so long-lived tasks still come back within the hour.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 3_600;

/// Backoff in seconds before the next attempt: `2^retries`, capped.
#[inline]
pub fn compute_retry_backoff_seconds(retries: i32) -> u64 {
    2_u64
        .checked_pow(retries.max(0) as u32)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// Error returned by a task handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Transient; the task is retried with backoff.
    #[error("{0}")]
    Recoverable(String),

    /// Permanent (bad payload, missing configuration); fails without retry.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl TaskError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        TaskError::Recoverable(message.into())
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        TaskError::Unrecoverable(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TaskError::Unrecoverable(_))
    }
}

impl From<DomainError> for TaskError {
    /// Store outages and lost races are retried; everything else is permanent.
    fn from(err: DomainError) -> Self {
        if err.code.is_transient() {
            TaskError::Recoverable(err.to_string())
        } else {
            TaskError::Unrecoverable(err.to_string())
        }
    }
}

/// What to do with a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return to pending, eligible again at `run_at`.
    Retry { run_at: Timestamp, backoff_secs: u64 },
    /// Terminal failure, surfaced through the dead-letter listing.
    Fail,
}

/// Decides the fate of `task` after `error`.
///
/// `task.attempts` must already count the attempt that failed.
pub fn decide(task: &Task, error: &TaskError, now: Timestamp) -> RetryDecision {
    if !error.is_recoverable() || task.attempts_exhausted() {
        return RetryDecision::Fail;
    }
    let backoff_secs = compute_retry_backoff_seconds(task.retries());
    RetryDecision::Retry {
        run_at: now.plus_secs(backoff_secs),
        backoff_secs,
    }
}
