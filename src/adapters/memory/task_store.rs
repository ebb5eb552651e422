//! In-memory TaskStore.
//!
//! A single mutex serializes claims, so no task is leased twice.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, TaskId, Timestamp};
use crate::domain::jobs::{QueueClass, Task, TaskStatus};
use crate::ports::{EnqueueResult, ReapReport, TaskStore};

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    dedupe_keys: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    inner: Mutex<Inner>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks in a given status, oldest first.
    pub async fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<_> = inner
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        tasks
    }
}

fn not_found(id: &TaskId) -> DomainError {
    DomainError::new(ErrorCode::NotFound, "Task not found").with_detail("task_id", id.to_string())
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, task: &Task) -> Result<EnqueueResult, DomainError> {
        let mut inner = self.inner.lock().await;
        if let Some(key) = &task.dedupe_key {
            if !inner.dedupe_keys.insert(key.clone()) {
                return Ok(EnqueueResult::Duplicate);
            }
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(EnqueueResult::Enqueued(task.id))
    }

    async fn claim_next(
        &self,
        class: QueueClass,
        now: Timestamp,
        lease: Duration,
    ) -> Result<Option<Task>, DomainError> {
        let mut inner = self.inner.lock().await;
        let next = inner
            .tasks
            .values()
            .filter(|t| t.queue == class && t.is_ready(now))
            .min_by_key(|t| (t.run_at, t.created_at, t.id))
            .map(|t| t.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let task = inner.tasks.get_mut(&id).ok_or_else(|| not_found(&id))?;
        task.status = TaskStatus::Running;
        task.attempts += 1;
        task.locked_until = Some(now.plus_secs(lease.as_secs().max(1)));
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: &TaskId, now: Timestamp) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| not_found(id))?;
        task.status = TaskStatus::Completed;
        task.locked_until = None;
        task.completed_at = Some(now);
        task.updated_at = now;
        Ok(())
    }

    async fn retry(
        &self,
        id: &TaskId,
        run_at: Timestamp,
        error: &str,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| not_found(id))?;
        task.status = TaskStatus::Pending;
        task.run_at = run_at;
        task.locked_until = None;
        task.last_error = Some(error.to_string());
        Ok(())
    }

    async fn fail(&self, id: &TaskId, error: &str, now: Timestamp) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(id).ok_or_else(|| not_found(id))?;
        task.status = TaskStatus::Failed;
        task.locked_until = None;
        task.last_error = Some(error.to_string());
        task.updated_at = now;
        Ok(())
    }

    async fn reap_stale(&self, now: Timestamp) -> Result<ReapReport, DomainError> {
        let mut inner = self.inner.lock().await;
        let mut report = ReapReport::default();
        for task in inner.tasks.values_mut() {
            let expired = task
                .locked_until
                .map(|until| until.is_before(&now))
                .unwrap_or(false);
            if task.status != TaskStatus::Running || !expired {
                continue;
            }
            if task.attempts_exhausted() {
                task.status = TaskStatus::Failed;
                report.failed += 1;
            } else {
                task.status = TaskStatus::Pending;
                task.run_at = now;
                report.requeued += 1;
            }
            task.locked_until = None;
            task.last_error = Some("lease expired".to_string());
            task.updated_at = now;
        }
        Ok(report)
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, DomainError> {
        Ok(self.inner.lock().await.tasks.get(id).cloned())
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<Task>, DomainError> {
        let inner = self.inner.lock().await;
        let mut failed: Vec<_> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::{NewTask, TaskType};
    use serde_json::json;
    use std::sync::Arc;

    const LEASE: Duration = Duration::from_secs(30);

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_unix_secs(secs)
    }

    fn task(queue: QueueClass, run_at: u64) -> Task {
        Task::from_new(
            NewTask::new(TaskType::LedgerSync, json!({})).queue(queue).run_at(at(run_at)),
            3,
            at(run_at),
        )
    }

    #[tokio::test]
    async fn dedupe_key_prevents_second_enqueue() {
        let store = InMemoryTaskStore::new();
        let make = || {
            Task::from_new(
                NewTask::new(TaskType::DailyAnalytics, json!({})).dedupe_key("daily_analytics:86400"),
                3,
                at(0),
            )
        };
        assert!(matches!(store.enqueue(&make()).await.unwrap(), EnqueueResult::Enqueued(_)));
        assert_eq!(store.enqueue(&make()).await.unwrap(), EnqueueResult::Duplicate);
    }

    #[tokio::test]
    async fn claim_takes_oldest_ready_task_of_class() {
        let store = InMemoryTaskStore::new();
        let later = task(QueueClass::Low, 20);
        let earlier = task(QueueClass::Low, 10);
        let future = task(QueueClass::Low, 500);
        let other_class = task(QueueClass::Critical, 1);
        for t in [&later, &earlier, &future, &other_class] {
            store.enqueue(t).await.unwrap();
        }

        let claimed = store.claim_next(QueueClass::Low, at(100), LEASE).await.unwrap().unwrap();
        assert_eq!(claimed.id, earlier.id);
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.locked_until, Some(at(130)));

        let second = store.claim_next(QueueClass::Low, at(100), LEASE).await.unwrap().unwrap();
        assert_eq!(second.id, later.id);
        assert!(store.claim_next(QueueClass::Low, at(100), LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_task() {
        let store = Arc::new(InMemoryTaskStore::new());
        for i in 0..20 {
            store.enqueue(&task(QueueClass::Default, i)).await.unwrap();
        }
        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_next(QueueClass::Default, at(100), LEASE).await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            if let Some(t) = handle.await.unwrap() {
                assert!(ids.insert(t.id));
            }
        }
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn reaper_returns_expired_leases_only() {
        let store = InMemoryTaskStore::new();
        let t = task(QueueClass::Default, 0);
        store.enqueue(&t).await.unwrap();
        store.claim_next(QueueClass::Default, at(0), LEASE).await.unwrap();

        assert!(store.reap_stale(at(30)).await.unwrap().is_empty());
        assert_eq!(store.reap_stale(at(31)).await.unwrap().requeued, 1);

        let reaped = store.find_by_id(&t.id).await.unwrap().unwrap();
        assert_eq!(reaped.status, TaskStatus::Pending);
        assert_eq!(reaped.attempts, 1);
        let again = store.claim_next(QueueClass::Default, at(31), LEASE).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn lease_expiry_on_the_last_attempt_fails_the_task() {
        let store = InMemoryTaskStore::new();
        let t = task(QueueClass::Default, 0);
        store.enqueue(&t).await.unwrap();

        // max_attempts is 3; every attempt dies without settling the task.
        let mut clock = 0;
        for _ in 0..3 {
            store.claim_next(QueueClass::Default, at(clock), LEASE).await.unwrap().unwrap();
            clock += LEASE.as_secs() + 1;
            store.reap_stale(at(clock)).await.unwrap();
        }

        let stored = store.find_by_id(&t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert_eq!(stored.last_error.as_deref(), Some("lease expired"));
        assert!(store.claim_next(QueueClass::Default, at(clock), LEASE).await.unwrap().is_none());
        assert_eq!(store.list_failed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_tasks_are_listed_newest_first() {
        let store = InMemoryTaskStore::new();
        let a = task(QueueClass::Low, 0);
        let b = task(QueueClass::Low, 0);
        store.enqueue(&a).await.unwrap();
        store.enqueue(&b).await.unwrap();
        store.fail(&a.id, "bad payload", at(5)).await.unwrap();
        store.fail(&b.id, "bad payload", at(9)).await.unwrap();

        let failed = store.list_failed(10).await.unwrap();
        assert_eq!(failed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(failed[0].last_error.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn retry_reschedules_as_pending() {
        let store = InMemoryTaskStore::new();
        let t = task(QueueClass::Critical, 0);
        store.enqueue(&t).await.unwrap();
        store.claim_next(QueueClass::Critical, at(0), LEASE).await.unwrap();
        store.retry(&t.id, at(2), "timeout").await.unwrap();

        assert!(store.claim_next(QueueClass::Critical, at(1), LEASE).await.unwrap().is_none());
        assert!(store.claim_next(QueueClass::Critical, at(2), LEASE).await.unwrap().is_some());
    }
}
