//! ReceiptVerifier port - opaque per-platform receipt validation.
//!
//! The app stores are external collaborators; this crate only consumes the
//! validated result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::Platform;

/// What to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptRequest {
    pub platform: Platform,
    /// Receipt data (iOS), purchase token (Android) or checkout session id (Stripe).
    pub receipt: String,
    /// Required by stores that look purchases up per product.
    pub product_id: Option<String>,
}

/// Verified store answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedReceipt {
    pub valid: bool,
    pub transaction_id: String,
    pub product_id: String,
    pub expires_at: Option<Timestamp>,
    pub is_renewable: bool,
    /// Id the store uses in later notifications for this subscription.
    #[serde(default)]
    pub provider_subscription_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    /// The store rejected the receipt.
    #[error("receipt rejected: {0}")]
    Rejected(String),

    #[error("receipt verifier unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ReceiptVerifier: Send + Sync {
    async fn verify(&self, request: &ReceiptRequest) -> Result<VerifiedReceipt, ReceiptError>;
}
