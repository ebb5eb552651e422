//! TransactionRepository port - the payment ledger.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{ReceiptHash, Transaction};

use super::SaveResult;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Records a transaction unless one with the same receipt hash exists.
    ///
    /// Uses `ON CONFLICT DO NOTHING` semantics; a duplicate is not an error.
    async fn insert(&self, transaction: &Transaction) -> Result<SaveResult, DomainError>;

    async fn find_by_receipt_hash(
        &self,
        hash: &ReceiptHash,
    ) -> Result<Option<Transaction>, DomainError>;

    /// Sum of all recorded amounts for the user, in cents.
    async fn total_for_user(&self, user_id: &UserId) -> Result<i64, DomainError>;

    /// Sum of amounts recorded in `[from, to)`, in cents.
    async fn revenue_between(&self, from: Timestamp, to: Timestamp) -> Result<i64, DomainError>;
}
