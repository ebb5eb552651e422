//! In-memory TransactionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{ReceiptHash, Transaction};
use crate::ports::{SaveResult, TransactionRepository};

/// Keyed by receipt hash, which is unique.
#[derive(Debug, Default)]
pub struct InMemoryTransactionRepository {
    rows: RwLock<HashMap<String, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<SaveResult, DomainError> {
        let mut rows = self.rows.write().await;
        let key = transaction.receipt_hash.as_str().to_string();
        if rows.contains_key(&key) {
            return Ok(SaveResult::AlreadyExists);
        }
        rows.insert(key, transaction.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find_by_receipt_hash(
        &self,
        hash: &ReceiptHash,
    ) -> Result<Option<Transaction>, DomainError> {
        Ok(self.rows.read().await.get(hash.as_str()).cloned())
    }

    async fn total_for_user(&self, user_id: &UserId) -> Result<i64, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|t| &t.user_id == user_id)
            .map(|t| t.amount_cents)
            .sum())
    }

    async fn revenue_between(&self, from: Timestamp, to: Timestamp) -> Result<i64, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|t| !t.created_at.is_before(&from) && t.created_at.is_before(&to))
            .map(|t| t.amount_cents)
            .sum())
    }
}
