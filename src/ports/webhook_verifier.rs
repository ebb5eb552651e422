//! WebhookVerifier port - provider-specific authenticity checks.
//!
//! Verification completes before anything is persisted. Implementations
//! return the event identity extracted from the verified payload.

use async_trait::async_trait;

use crate::domain::webhook::{Provider, VerifiedEvent, WebhookError, WebhookHeaders};

#[async_trait]
pub trait WebhookVerifier: Send + Sync {
    fn provider(&self) -> Provider;

    async fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<VerifiedEvent, WebhookError>;
}
