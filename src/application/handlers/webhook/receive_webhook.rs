//! ReceiveWebhookHandler - verify, then record in the inbox.
//!
//! Nothing is persisted before verification succeeds. A second delivery of
//! the same `(provider, event_id)` is acknowledged as a duplicate and has no
//! further effect; processing happens later in the sweep.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::domain::webhook::{Provider, ReceiveOutcome, WebhookError, WebhookEvent, WebhookHeaders};
use crate::ports::{SaveResult, WebhookEventRepository, WebhookVerifier};

#[derive(Debug, Clone)]
pub struct ReceiveWebhookCommand {
    /// Provider name from the request path.
    pub provider: String,
    pub body: Vec<u8>,
    pub headers: WebhookHeaders,
}

pub struct ReceiveWebhookHandler {
    verifiers: HashMap<Provider, Arc<dyn WebhookVerifier>>,
    events: Arc<dyn WebhookEventRepository>,
}

impl ReceiveWebhookHandler {
    pub fn new(
        verifiers: impl IntoIterator<Item = Arc<dyn WebhookVerifier>>,
        events: Arc<dyn WebhookEventRepository>,
    ) -> Self {
        let verifiers = verifiers
            .into_iter()
            .map(|v| (v.provider(), v))
            .collect();
        Self { verifiers, events }
    }

    pub async fn handle(
        &self,
        cmd: ReceiveWebhookCommand,
        now: Timestamp,
    ) -> Result<ReceiveOutcome, WebhookError> {
        let provider = Provider::from_str(&cmd.provider)?;
        let verifier = self
            .verifiers
            .get(&provider)
            .ok_or_else(|| WebhookError::UnknownProvider(cmd.provider.clone()))?;

        let verified = verifier.verify(&cmd.body, &cmd.headers).await.map_err(|e| {
            if e.is_verification_failure() {
                tracing::warn!(provider = %provider, error = %e, "Webhook failed verification");
            } else {
                tracing::error!(provider = %provider, error = %e, "Webhook could not be verified");
            }
            e
        })?;

        let event = WebhookEvent::received(
            verified,
            String::from_utf8_lossy(&cmd.body).into_owned(),
            now,
        );
        match self.events.insert(&event).await? {
            SaveResult::Inserted => {
                tracing::info!(
                    provider = %provider,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Webhook accepted"
                );
                Ok(ReceiveOutcome::Accepted)
            }
            SaveResult::AlreadyExists => {
                tracing::debug!(
                    provider = %provider,
                    event_id = %event.event_id,
                    "Duplicate webhook acknowledged"
                );
                Ok(ReceiveOutcome::Duplicate)
            }
        }
    }
}
