//! TaskEnqueuer - turns `NewTask` requests into stored tasks.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{NewTask, Task};
use crate::ports::{EnqueueResult, TaskStore};

#[derive(Clone)]
pub struct TaskEnqueuer {
    store: Arc<dyn TaskStore>,
    default_max_attempts: i32,
}

impl TaskEnqueuer {
    pub fn new(store: Arc<dyn TaskStore>, default_max_attempts: i32) -> Self {
        Self {
            store,
            default_max_attempts,
        }
    }

    pub async fn enqueue(&self, new: NewTask, now: Timestamp) -> Result<EnqueueResult, DomainError> {
        let task = Task::from_new(new, self.default_max_attempts, now);
        let result = self.store.enqueue(&task).await?;
        match result {
            EnqueueResult::Enqueued(id) => tracing::debug!(
                task.id = %id,
                task.task_type = %task.task_type,
                task.queue = %task.queue,
                "Task enqueued"
            ),
            EnqueueResult::Duplicate => tracing::debug!(
                task.task_type = %task.task_type,
                dedupe_key = ?task.dedupe_key,
                "Task already enqueued"
            ),
        }
        Ok(result)
    }

    /// Enqueues a side-effect task; failures are logged, not returned.
    pub async fn enqueue_follow_up(&self, new: NewTask, now: Timestamp) {
        let task_type = new.task_type;
        if let Err(e) = self.enqueue(new, now).await {
            tracing::warn!(task.task_type = %task_type, error = %e, "Failed to enqueue follow-up task");
        }
    }
}

impl std::fmt::Debug for TaskEnqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnqueuer")
            .field("default_max_attempts", &self.default_max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTaskStore;
    use crate::domain::jobs::{QueueClass, TaskType};
    use serde_json::json;

    #[tokio::test]
    async fn applies_default_max_attempts() {
        let store = Arc::new(InMemoryTaskStore::new());
        let enqueuer = TaskEnqueuer::new(store.clone(), 7);
        let now = Timestamp::from_unix_secs(1_700_000_000);

        let id = match enqueuer
            .enqueue(NewTask::new(TaskType::LedgerSync, json!({})), now)
            .await
            .unwrap()
        {
            EnqueueResult::Enqueued(id) => id,
            EnqueueResult::Duplicate => panic!("first enqueue must be stored"),
        };
        let task = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(task.max_attempts, 7);
        assert_eq!(task.queue, QueueClass::Default);
    }

    #[tokio::test]
    async fn dedupe_key_suppresses_second_enqueue() {
        let enqueuer = TaskEnqueuer::new(Arc::new(InMemoryTaskStore::new()), 5);
        let now = Timestamp::from_unix_secs(1_700_000_000);
        let new = NewTask::new(TaskType::WebhookSweep, json!({})).dedupe_key("webhook_sweep:60");

        assert!(matches!(
            enqueuer.enqueue(new.clone(), now).await.unwrap(),
            EnqueueResult::Enqueued(_)
        ));
        assert_eq!(enqueuer.enqueue(new, now).await.unwrap(), EnqueueResult::Duplicate);
    }
}
