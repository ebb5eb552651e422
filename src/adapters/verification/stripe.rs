//! Stripe `WebhookVerifier`: the signature check at the current time.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::foundation::Timestamp;
use crate::domain::webhook::{
    Provider, StripeSignatureVerifier, VerifiedEvent, WebhookError, WebhookHeaders,
};
use crate::ports::WebhookVerifier;

pub struct StripeWebhookVerifier {
    inner: StripeSignatureVerifier,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            inner: StripeSignatureVerifier::new(secret),
        }
    }
}

#[async_trait]
impl WebhookVerifier for StripeWebhookVerifier {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    async fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<VerifiedEvent, WebhookError> {
        let now = Timestamp::now().as_unix_secs() as i64;
        self.inner.verify(body, headers, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::stripe::sign_for_test;

    const SECRET: &str = "whsec_adapter_test";

    #[tokio::test]
    async fn verifies_against_wall_clock() {
        let payload = r#"{"id":"evt_9","type":"invoice.paid","data":{"object":{}}}"#;
        let now = Timestamp::now().as_unix_secs() as i64;
        let headers =
            WebhookHeaders::new().with("Stripe-Signature", sign_for_test(SECRET, now, payload));

        let verifier = StripeWebhookVerifier::new(SecretString::new(SECRET.to_string()));
        let event = verifier.verify(payload.as_bytes(), &headers).await.unwrap();
        assert_eq!(event.event_id, "evt_9");
        assert_eq!(verifier.provider(), Provider::Stripe);
    }

    #[tokio::test]
    async fn stale_signature_is_rejected() {
        let payload = r#"{"id":"evt_9","type":"invoice.paid","data":{"object":{}}}"#;
        let stale = Timestamp::now().as_unix_secs() as i64 - 3_600;
        let headers =
            WebhookHeaders::new().with("Stripe-Signature", sign_for_test(SECRET, stale, payload));

        let verifier = StripeWebhookVerifier::new(SecretString::new(SECRET.to_string()));
        assert!(matches!(
            verifier.verify(payload.as_bytes(), &headers).await,
            Err(WebhookError::TimestampOutOfRange)
        ));
    }
}
