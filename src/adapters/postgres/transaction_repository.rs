//! PostgreSQL implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, TransactionId, UserId};
use crate::domain::subscription::{ReceiptHash, Transaction};
use crate::ports::{SaveResult, TransactionRepository};

use super::{db_error, parse_column, parse_user_id};

pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: String,
    subscription_id: Uuid,
    amount_cents: i64,
    currency: String,
    receipt_hash: String,
    provider_tx_id: String,
    platform: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            user_id: parse_user_id(row.user_id)?,
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            amount_cents: row.amount_cents,
            currency: row.currency,
            receipt_hash: ReceiptHash::from_hex(row.receipt_hash),
            provider_tx_id: row.provider_tx_id,
            platform: parse_column("platform", &row.platform)?,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, subscription_id, amount_cents, currency, receipt_hash,
                provider_tx_id, platform, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (receipt_hash) DO NOTHING
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.user_id.as_str())
        .bind(transaction.subscription_id.as_uuid())
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(transaction.receipt_hash.as_str())
        .bind(&transaction.provider_tx_id)
        .bind(transaction.platform.as_str())
        .bind(transaction.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save transaction", e))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn find_by_receipt_hash(
        &self,
        hash: &ReceiptHash,
    ) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, subscription_id, amount_cents, currency, receipt_hash,
                   provider_tx_id, platform, created_at
            FROM transactions
            WHERE receipt_hash = $1
            "#,
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find transaction", e))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn total_for_user(&self, user_id: &UserId) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sum user transactions", e))
    }

    async fn revenue_between(&self, from: Timestamp, to: Timestamp) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM transactions
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(from.as_datetime())
        .bind(to.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sum revenue", e))
    }
}
