//! PostgreSQL implementation of TaskStore.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers (in any
//! number of processes) can poll the same queue without handing out a task
//! twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, TaskId, Timestamp};
use crate::domain::jobs::{QueueClass, Task};
use crate::ports::{EnqueueResult, ReapReport, TaskStore};

use super::{db_error, parse_column};

pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    task_type: String,
    queue: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    dedupe_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: TaskId::from_uuid(row.id),
            task_type: parse_column("task_type", &row.task_type)?,
            queue: parse_column("queue", &row.queue)?,
            payload: row.payload,
            status: parse_column("status", &row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: Timestamp::from_datetime(row.run_at),
            locked_until: row.locked_until.map(Timestamp::from_datetime),
            last_error: row.last_error,
            dedupe_key: row.dedupe_key,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

const RETURNING_COLUMNS: &str = r#"
    id, task_type, queue, payload, status, attempts, max_attempts, run_at, locked_until,
    last_error, dedupe_key, created_at, updated_at, completed_at
"#;

fn not_found(id: &TaskId) -> DomainError {
    DomainError::new(ErrorCode::NotFound, "Task not found").with_detail("task_id", id.to_string())
}

fn expect_one(
    id: &TaskId,
    result: Result<sqlx::postgres::PgQueryResult, sqlx::Error>,
    action: &str,
) -> Result<(), DomainError> {
    let result = result.map_err(|e| db_error(action, e))?;
    if result.rows_affected() == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn enqueue(&self, task: &Task) -> Result<EnqueueResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (
                id, task_type, queue, payload, status, attempts, max_attempts, run_at,
                locked_until, last_error, dedupe_key, created_at, updated_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.task_type.as_str())
        .bind(task.queue.as_str())
        .bind(&task.payload)
        .bind(task.status.as_str())
        .bind(task.attempts)
        .bind(task.max_attempts)
        .bind(task.run_at.as_datetime())
        .bind(task.locked_until.as_ref().map(|t| *t.as_datetime()))
        .bind(&task.last_error)
        .bind(&task.dedupe_key)
        .bind(task.created_at.as_datetime())
        .bind(task.updated_at.as_datetime())
        .bind(task.completed_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("enqueue task", e))?;

        if result.rows_affected() == 0 {
            Ok(EnqueueResult::Duplicate)
        } else {
            Ok(EnqueueResult::Enqueued(task.id))
        }
    }

    async fn claim_next(
        &self,
        class: QueueClass,
        now: Timestamp,
        lease: Duration,
    ) -> Result<Option<Task>, DomainError> {
        let locked_until = now.plus_secs(lease.as_secs().max(1));
        let query = format!(
            r#"
            UPDATE scheduled_tasks SET
                status = 'running',
                attempts = attempts + 1,
                locked_until = $3,
                updated_at = $2
            WHERE id = (
                SELECT id FROM scheduled_tasks
                WHERE queue = $1 AND status = 'pending' AND run_at <= $2
                ORDER BY run_at, created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(class.as_str())
            .bind(now.as_datetime())
            .bind(locked_until.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("claim task", e))?;

        row.map(Task::try_from).transpose()
    }

    async fn complete(&self, id: &TaskId, now: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET status = 'completed', locked_until = NULL, completed_at = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await;
        expect_one(id, result, "complete task")
    }

    async fn retry(
        &self,
        id: &TaskId,
        run_at: Timestamp,
        error: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET status = 'pending', locked_until = NULL, run_at = $2, last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(run_at.as_datetime())
        .bind(error)
        .execute(&self.pool)
        .await;
        expect_one(id, result, "reschedule task")
    }

    async fn fail(&self, id: &TaskId, error: &str, now: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET status = 'failed', locked_until = NULL, last_error = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await;
        expect_one(id, result, "fail task")
    }

    async fn reap_stale(&self, now: Timestamp) -> Result<ReapReport, DomainError> {
        let statuses: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE scheduled_tasks
            SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                run_at = CASE WHEN attempts >= max_attempts THEN run_at ELSE $1 END,
                locked_until = NULL,
                last_error = 'lease expired',
                updated_at = $1
            WHERE status = 'running' AND locked_until < $1
            RETURNING status
            "#,
        )
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("reap stale tasks", e))?;

        let failed = statuses.iter().filter(|s| s.as_str() == "failed").count() as u64;
        Ok(ReapReport {
            requeued: statuses.len() as u64 - failed,
            failed,
        })
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, DomainError> {
        let query = format!("SELECT {} FROM scheduled_tasks WHERE id = $1", RETURNING_COLUMNS);
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find task", e))?;

        row.map(Task::try_from).transpose()
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<Task>, DomainError> {
        let query = format!(
            "SELECT {} FROM scheduled_tasks WHERE status = 'failed' ORDER BY updated_at DESC LIMIT $1",
            RETURNING_COLUMNS
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list failed tasks", e))?;

        rows.into_iter().map(Task::try_from).collect()
    }
}
