//! Apple `WebhookVerifier`.
//!
//! The `signedPayload` JWS is verified against the key its header names;
//! the notification UUID becomes the inbox event id.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, Validation};

use crate::domain::webhook::apple::{AppleNotification, SignedNotificationBody};
use crate::domain::webhook::{Provider, VerifiedEvent, WebhookError, WebhookHeaders};
use crate::ports::{KeySetProvider, WebhookVerifier};

use super::{map_jwt_error, resolve_key};

pub struct AppleWebhookVerifier {
    keys: Arc<dyn KeySetProvider>,
}

impl AppleWebhookVerifier {
    pub fn new(keys: Arc<dyn KeySetProvider>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl WebhookVerifier for AppleWebhookVerifier {
    fn provider(&self) -> Provider {
        Provider::Apple
    }

    async fn verify(
        &self,
        body: &[u8],
        _headers: &WebhookHeaders,
    ) -> Result<VerifiedEvent, WebhookError> {
        let envelope: SignedNotificationBody =
            serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let token = envelope.signed_payload.trim();

        let (key, alg) = resolve_key(self.keys.as_ref(), token).await?;

        // Notifications carry no exp/aud; authenticity is the signature alone.
        let mut validation = Validation::new(alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let payload = decode::<serde_json::Value>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        let notification: AppleNotification = serde_json::from_value(payload.clone())
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if notification.notification_uuid.trim().is_empty() {
            return Err(WebhookError::MissingField("notificationUUID"));
        }

        Ok(VerifiedEvent {
            provider: Provider::Apple,
            event_id: notification.notification_uuid,
            event_type: notification.notification_type,
            payload,
        })
    }
}
