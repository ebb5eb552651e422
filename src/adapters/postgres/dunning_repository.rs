//! PostgreSQL implementation of DunningRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::dunning::Dunning;
use crate::domain::foundation::{DomainError, DunningId, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::DunningRepository;

use super::{cas_failure, db_error, parse_column, parse_user_id, violates};

pub struct PostgresDunningRepository {
    pool: PgPool,
}

impl PostgresDunningRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DunningRow {
    id: Uuid,
    subscription_id: Uuid,
    user_id: String,
    attempt_count: i32,
    max_attempts: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    status: String,
    last_failure_reason: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DunningRow> for Dunning {
    type Error = DomainError;

    fn try_from(row: DunningRow) -> Result<Self, Self::Error> {
        Ok(Dunning {
            id: DunningId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            user_id: parse_user_id(row.user_id)?,
            attempt_count: row.attempt_count.max(0) as u32,
            max_attempts: row.max_attempts.max(1) as u32,
            next_attempt_at: row.next_attempt_at.map(Timestamp::from_datetime),
            status: parse_column("status", &row.status)?,
            last_failure_reason: row.last_failure_reason,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, subscription_id, user_id, attempt_count, max_attempts, next_attempt_at,
           status, last_failure_reason, version, created_at, updated_at
    FROM dunning_runs
"#;

#[async_trait]
impl DunningRepository for PostgresDunningRepository {
    async fn insert(&self, dunning: &Dunning) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO dunning_runs (
                id, subscription_id, user_id, attempt_count, max_attempts, next_attempt_at,
                status, last_failure_reason, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(dunning.id.as_uuid())
        .bind(dunning.subscription_id.as_uuid())
        .bind(dunning.user_id.as_str())
        .bind(dunning.attempt_count as i32)
        .bind(dunning.max_attempts as i32)
        .bind(dunning.next_attempt_at.as_ref().map(|t| *t.as_datetime()))
        .bind(dunning.status.as_str())
        .bind(&dunning.last_failure_reason)
        .bind(dunning.version)
        .bind(dunning.created_at.as_datetime())
        .bind(dunning.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "dunning_runs_one_open_per_subscription") {
                return DomainError::new(
                    ErrorCode::DuplicateEntity,
                    "Subscription already has an open dunning run",
                );
            }
            db_error("save dunning run", e)
        })?;

        Ok(())
    }

    async fn update(&self, dunning: &mut Dunning) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE dunning_runs SET
                attempt_count = $3,
                next_attempt_at = $4,
                status = $5,
                last_failure_reason = $6,
                updated_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(dunning.id.as_uuid())
        .bind(dunning.version)
        .bind(dunning.attempt_count as i32)
        .bind(dunning.next_attempt_at.as_ref().map(|t| *t.as_datetime()))
        .bind(dunning.status.as_str())
        .bind(&dunning.last_failure_reason)
        .bind(dunning.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update dunning run", e))?;

        if result.rows_affected() == 0 {
            return Err(cas_failure(&self.pool, "dunning_runs", "dunning", dunning.id.as_uuid()).await);
        }

        dunning.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &DunningId) -> Result<Option<Dunning>, DomainError> {
        let query = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row: Option<DunningRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find dunning run", e))?;

        row.map(Dunning::try_from).transpose()
    }

    async fn find_open_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Dunning>, DomainError> {
        let query = format!(
            "{} WHERE subscription_id = $1 AND status IN ('pending', 'in_progress')",
            SELECT_COLUMNS
        );
        let row: Option<DunningRow> = sqlx::query_as(&query)
            .bind(subscription_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find open dunning run", e))?;

        row.map(Dunning::try_from).transpose()
    }
}
