//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The `(provider, event_id)` unique constraint is the idempotency gate:
//! `ON CONFLICT DO NOTHING` turns a redelivery into `AlreadyExists` without
//! a read-then-write race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::webhook::{Provider, WebhookEvent};
use crate::ports::{SaveResult, WebhookEventRepository};

use super::{db_error, parse_column};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    provider: String,
    event_id: String,
    event_type: String,
    raw_payload: String,
    payload: serde_json::Value,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEvent {
            provider: parse_column("provider", &row.provider)?,
            event_id: row.event_id,
            event_type: row.event_type,
            raw_payload: row.raw_payload,
            payload: row.payload,
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            failed_at: row.failed_at.map(Timestamp::from_datetime),
            attempts: row.attempts,
            last_error: row.last_error,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT provider, event_id, event_type, raw_payload, payload, received_at, processed_at,
           failed_at, attempts, last_error
    FROM webhook_events
"#;

fn not_found(provider: Provider, event_id: &str) -> DomainError {
    DomainError::new(ErrorCode::NotFound, "Webhook event not found")
        .with_detail("provider", provider.as_str())
        .with_detail("event_id", event_id)
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                provider, event_id, event_type, raw_payload, payload, received_at,
                processed_at, failed_at, attempts, last_error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(event.provider.as_str())
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.raw_payload)
        .bind(&event.payload)
        .bind(event.received_at.as_datetime())
        .bind(event.processed_at.as_ref().map(|t| *t.as_datetime()))
        .bind(event.failed_at.as_ref().map(|t| *t.as_datetime()))
        .bind(event.attempts)
        .bind(&event.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save webhook event", e))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn find(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        let query = format!("{} WHERE provider = $1 AND event_id = $2", SELECT_COLUMNS);
        let row: Option<WebhookEventRow> = sqlx::query_as(&query)
            .bind(provider.as_str())
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find webhook event", e))?;

        row.map(WebhookEvent::try_from).transpose()
    }

    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let query = format!(
            "{} WHERE processed_at IS NULL AND failed_at IS NULL \
             ORDER BY attempts, received_at, event_id LIMIT $1",
            SELECT_COLUMNS
        );
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list unprocessed webhook events", e))?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let query = format!(
            "{} WHERE failed_at IS NOT NULL ORDER BY failed_at DESC LIMIT $1",
            SELECT_COLUMNS
        );
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list failed webhook events", e))?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }

    async fn mark_processed(
        &self,
        provider: Provider,
        event_id: &str,
        at: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed_at = $3, last_error = NULL
            WHERE provider = $1 AND event_id = $2 AND processed_at IS NULL AND failed_at IS NULL
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark webhook event processed", e))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.find(provider, event_id).await? {
            Some(_) => Ok(false),
            None => Err(not_found(provider, event_id)),
        }
    }

    async fn record_failure(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET attempts = attempts + 1, last_error = $3
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record webhook failure", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(provider, event_id));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET attempts = attempts + 1, last_error = $3, failed_at = $4
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .bind(error)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark webhook event failed", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(provider, event_id));
        }
        Ok(())
    }
}
