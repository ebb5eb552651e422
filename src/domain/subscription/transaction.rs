//! Payment transactions and receipt hashing.

use crate::domain::foundation::{SubscriptionId, Timestamp, TransactionId, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::Platform;

/// SHA-256 hex digest of a raw client receipt.
///
/// Uniquely identifies a processed receipt; the transactions table carries a
/// unique index on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHash(String);

impl ReceiptHash {
    /// Hashes a raw receipt.
    ///
    /// # Errors
    ///
    /// `EmptyField` if the receipt is blank.
    pub fn of(raw_receipt: &str) -> Result<Self, ValidationError> {
        let trimmed = raw_receipt.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("receipt"));
        }
        let digest = Sha256::digest(trimmed.as_bytes());
        Ok(Self(hex::encode(digest)))
    }

    /// Wraps an already-computed digest loaded from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recorded payment.
///
/// Money is stored as integer minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub amount_cents: i64,
    /// ISO 4217 code, upper case.
    pub currency: String,
    pub receipt_hash: ReceiptHash,
    pub provider_tx_id: String,
    pub platform: Platform,
    pub created_at: Timestamp,
}

impl Transaction {
    /// Records a new transaction.
    ///
    /// # Errors
    ///
    /// Rejects negative amounts, malformed currency codes and empty provider ids.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        user_id: UserId,
        subscription_id: SubscriptionId,
        amount_cents: i64,
        currency: &str,
        receipt_hash: ReceiptHash,
        provider_tx_id: impl Into<String>,
        platform: Platform,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if amount_cents < 0 {
            return Err(ValidationError::out_of_range(
                "amount_cents",
                0,
                i64::MAX,
                amount_cents,
            ));
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "expected a three-letter ISO 4217 code",
            ));
        }
        let provider_tx_id = provider_tx_id.into();
        if provider_tx_id.trim().is_empty() {
            return Err(ValidationError::empty_field("provider_tx_id"));
        }

        Ok(Self {
            id: TransactionId::new(),
            user_id,
            subscription_id,
            amount_cents,
            currency,
            receipt_hash,
            provider_tx_id,
            platform,
            created_at: now,
        })
    }
}
