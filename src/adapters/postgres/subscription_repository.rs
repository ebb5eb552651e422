//! PostgreSQL implementation of SubscriptionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{Platform, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

use super::{cas_failure, db_error, parse_column, parse_user_id, violates};

const ONE_CURRENT_PER_USER: &str = "subscriptions_one_current_per_user";

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    status: String,
    plan_type: String,
    source: String,
    product_id: String,
    provider_subscription_id: Option<String>,
    expires_at: DateTime<Utc>,
    auto_renew: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            status: parse_column("status", &row.status)?,
            plan_type: parse_column("plan_type", &row.plan_type)?,
            source: parse_column("source", &row.source)?,
            product_id: row.product_id,
            provider_subscription_id: row.provider_subscription_id,
            expires_at: Timestamp::from_datetime(row.expires_at),
            auto_renew: row.auto_renew,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            deleted_at: row.deleted_at.map(Timestamp::from_datetime),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, status, plan_type, source, product_id, provider_subscription_id,
           expires_at, auto_renew, version, created_at, updated_at, cancelled_at, deleted_at
    FROM subscriptions
"#;

fn duplicate_current() -> DomainError {
    DomainError::new(
        ErrorCode::DuplicateEntity,
        "User already has an active subscription",
    )
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, status, plan_type, source, product_id, provider_subscription_id,
                expires_at, auto_renew, version, created_at, updated_at, cancelled_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.plan_type.as_str())
        .bind(subscription.source.as_str())
        .bind(&subscription.product_id)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.expires_at.as_datetime())
        .bind(subscription.auto_renew)
        .bind(subscription.version)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.cancelled_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.deleted_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, ONE_CURRENT_PER_USER) {
                return duplicate_current();
            }
            db_error("save subscription", e)
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $3,
                plan_type = $4,
                product_id = $5,
                provider_subscription_id = $6,
                expires_at = $7,
                auto_renew = $8,
                updated_at = $9,
                cancelled_at = $10,
                deleted_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.status.as_str())
        .bind(subscription.plan_type.as_str())
        .bind(&subscription.product_id)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.expires_at.as_datetime())
        .bind(subscription.auto_renew)
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.cancelled_at.as_ref().map(|t| *t.as_datetime()))
        .bind(subscription.deleted_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, ONE_CURRENT_PER_USER) {
                return duplicate_current();
            }
            db_error("update subscription", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(
                cas_failure(&self.pool, "subscriptions", "subscription", subscription.id.as_uuid())
                    .await,
            );
        }

        subscription.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let query = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let query = format!(
            "{} WHERE user_id = $1 AND status IN ('active', 'grace') AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find current subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let query = format!(
            "{} WHERE user_id = $1 AND deleted_at IS NULL ORDER BY updated_at DESC, created_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find latest subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_provider_id(
        &self,
        source: Platform,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let query = format!(
            "{} WHERE source = $1 AND provider_subscription_id = $2 ORDER BY updated_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&query)
            .bind(source.as_str())
            .bind(provider_subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription by provider id", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn count_by_status(&self) -> Result<Vec<(SubscriptionStatus, i64)>, DomainError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)::BIGINT
            FROM subscriptions
            WHERE deleted_at IS NULL
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("count subscriptions", e))?;

        rows.into_iter()
            .map(|(status, count)| Ok((parse_column("status", &status)?, count)))
            .collect()
    }
}
