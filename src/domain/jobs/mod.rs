//! Background work: task records, retry policy, queue weighting and
//! recurring schedules. Execution lives in the scheduler adapter.

mod retry;
mod schedule;
mod selector;
mod task;

pub use retry::{
    compute_retry_backoff_seconds, decide, RetryDecision, TaskError, MAX_RETRY_BACKOFF_SECS,
};
pub use schedule::ScheduleSpec;
pub use selector::{QueueWeights, WeightedSelector};
pub use task::{NewTask, QueueClass, Task, TaskStatus, TaskType};
