//! PostgreSQL implementation of WinbackRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Timestamp, WinbackOfferId};
use crate::domain::winback::{Discount, WinbackOffer};
use crate::ports::WinbackRepository;

use super::{cas_failure, db_error, parse_column, parse_user_id};

pub struct PostgresWinbackRepository {
    pool: PgPool,
}

impl PostgresWinbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WinbackRow {
    id: Uuid,
    user_id: String,
    campaign_id: String,
    discount_type: String,
    discount_value: i64,
    status: String,
    expires_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WinbackRow> for WinbackOffer {
    type Error = DomainError;

    fn try_from(row: WinbackRow) -> Result<Self, Self::Error> {
        Ok(WinbackOffer {
            id: WinbackOfferId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            campaign_id: row.campaign_id,
            discount: Discount {
                discount_type: parse_column("discount_type", &row.discount_type)?,
                value: row.discount_value,
            },
            status: parse_column("status", &row.status)?,
            expires_at: Timestamp::from_datetime(row.expires_at),
            responded_at: row.responded_at.map(Timestamp::from_datetime),
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, campaign_id, discount_type, discount_value, status, expires_at,
           responded_at, version, created_at, updated_at
    FROM winback_offers
"#;

#[async_trait]
impl WinbackRepository for PostgresWinbackRepository {
    async fn insert(&self, offer: &WinbackOffer) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO winback_offers (
                id, user_id, campaign_id, discount_type, discount_value, status, expires_at,
                responded_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(offer.id.as_uuid())
        .bind(offer.user_id.as_str())
        .bind(&offer.campaign_id)
        .bind(offer.discount.discount_type.as_str())
        .bind(offer.discount.value)
        .bind(offer.status.as_str())
        .bind(offer.expires_at.as_datetime())
        .bind(offer.responded_at.as_ref().map(|t| *t.as_datetime()))
        .bind(offer.version)
        .bind(offer.created_at.as_datetime())
        .bind(offer.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save winback offer", e))?;

        Ok(())
    }

    async fn update(&self, offer: &mut WinbackOffer) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE winback_offers SET
                status = $3,
                responded_at = $4,
                updated_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(offer.id.as_uuid())
        .bind(offer.version)
        .bind(offer.status.as_str())
        .bind(offer.responded_at.as_ref().map(|t| *t.as_datetime()))
        .bind(offer.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update winback offer", e))?;

        if result.rows_affected() == 0 {
            return Err(
                cas_failure(&self.pool, "winback_offers", "winback_offer", offer.id.as_uuid())
                    .await,
            );
        }

        offer.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &WinbackOfferId) -> Result<Option<WinbackOffer>, DomainError> {
        let query = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row: Option<WinbackRow> = sqlx::query_as(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find winback offer", e))?;

        row.map(WinbackOffer::try_from).transpose()
    }

    async fn list_expirable(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WinbackOffer>, DomainError> {
        let query = format!(
            "{} WHERE status = 'offered' AND expires_at <= $1 ORDER BY expires_at LIMIT $2",
            SELECT_COLUMNS
        );
        let rows: Vec<WinbackRow> = sqlx::query_as(&query)
            .bind(now.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list expirable winback offers", e))?;

        rows.into_iter().map(WinbackOffer::try_from).collect()
    }
}
