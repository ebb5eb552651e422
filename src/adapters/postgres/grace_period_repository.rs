//! PostgreSQL implementation of GracePeriodRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, GracePeriodId, SubscriptionId, Timestamp};
use crate::domain::grace_period::GracePeriod;
use crate::ports::GracePeriodRepository;

use super::{cas_failure, db_error, parse_column, parse_user_id, violates};

pub struct PostgresGracePeriodRepository {
    pool: PgPool,
}

impl PostgresGracePeriodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GracePeriodRow {
    id: Uuid,
    user_id: String,
    subscription_id: Uuid,
    status: String,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    version: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GracePeriodRow> for GracePeriod {
    type Error = DomainError;

    fn try_from(row: GracePeriodRow) -> Result<Self, Self::Error> {
        Ok(GracePeriod {
            id: GracePeriodId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            status: parse_column("status", &row.status)?,
            started_at: Timestamp::from_datetime(row.started_at),
            expires_at: Timestamp::from_datetime(row.expires_at),
            resolved_at: row.resolved_at.map(Timestamp::from_datetime),
            version: row.version,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, subscription_id, status, started_at, expires_at, resolved_at,
           version, updated_at
    FROM grace_periods
"#;

impl PostgresGracePeriodRepository {
    async fn fetch_many(
        &self,
        query: &str,
        at: Timestamp,
        limit: u32,
    ) -> Result<Vec<GracePeriod>, DomainError> {
        let rows: Vec<GracePeriodRow> = sqlx::query_as(query)
            .bind(at.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list grace periods", e))?;

        rows.into_iter().map(GracePeriod::try_from).collect()
    }
}

#[async_trait]
impl GracePeriodRepository for PostgresGracePeriodRepository {
    async fn insert(&self, grace: &GracePeriod) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO grace_periods (
                id, user_id, subscription_id, status, started_at, expires_at, resolved_at,
                version, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(grace.id.as_uuid())
        .bind(grace.user_id.as_str())
        .bind(grace.subscription_id.as_uuid())
        .bind(grace.status.as_str())
        .bind(grace.started_at.as_datetime())
        .bind(grace.expires_at.as_datetime())
        .bind(grace.resolved_at.as_ref().map(|t| *t.as_datetime()))
        .bind(grace.version)
        .bind(grace.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "grace_periods_one_active_per_subscription") {
                return DomainError::new(
                    ErrorCode::DuplicateEntity,
                    "Subscription already has an active grace period",
                );
            }
            db_error("save grace period", e)
        })?;

        Ok(())
    }

    async fn update(&self, grace: &mut GracePeriod) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE grace_periods SET
                status = $3,
                expires_at = $4,
                resolved_at = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(grace.id.as_uuid())
        .bind(grace.version)
        .bind(grace.status.as_str())
        .bind(grace.expires_at.as_datetime())
        .bind(grace.resolved_at.as_ref().map(|t| *t.as_datetime()))
        .bind(grace.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update grace period", e))?;

        if result.rows_affected() == 0 {
            return Err(
                cas_failure(&self.pool, "grace_periods", "grace_period", grace.id.as_uuid()).await,
            );
        }

        grace.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &GracePeriodId) -> Result<Option<GracePeriod>, DomainError> {
        let query = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row: Option<GracePeriodRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find grace period", e))?;

        row.map(GracePeriod::try_from).transpose()
    }

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<GracePeriod>, DomainError> {
        let query = format!(
            "{} WHERE subscription_id = $1 AND status = 'active'",
            SELECT_COLUMNS
        );
        let row: Option<GracePeriodRow> = sqlx::query_as(&query)
            .bind(subscription_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find active grace period", e))?;

        row.map(GracePeriod::try_from).transpose()
    }

    async fn list_overdue(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<GracePeriod>, DomainError> {
        let query = format!(
            "{} WHERE status = 'active' AND expires_at <= $1 ORDER BY expires_at LIMIT $2",
            SELECT_COLUMNS
        );
        self.fetch_many(&query, now, limit).await
    }

    async fn list_expired_unsettled(&self, limit: u32) -> Result<Vec<GracePeriod>, DomainError> {
        let rows: Vec<GracePeriodRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.user_id, g.subscription_id, g.status, g.started_at, g.expires_at,
                   g.resolved_at, g.version, g.updated_at
            FROM grace_periods g
            JOIN subscriptions s ON s.id = g.subscription_id
            WHERE g.status = 'expired'
              AND s.status = 'grace'
              AND NOT EXISTS (
                  SELECT 1 FROM grace_periods a
                  WHERE a.subscription_id = g.subscription_id AND a.status = 'active'
              )
            ORDER BY g.updated_at
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list unsettled grace periods", e))?;

        rows.into_iter().map(GracePeriod::try_from).collect()
    }
}
