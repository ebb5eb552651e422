//! Google `WebhookVerifier`.
//!
//! Pub/Sub push requests carry an OIDC identity token. The token must be
//! signed by a key from Google's key set, issued by Google and addressed
//! to our audience; only then is the body decoded.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, Validation};
use serde::Deserialize;

use crate::domain::webhook::google::parse_push;
use crate::domain::webhook::{Provider, VerifiedEvent, WebhookError, WebhookHeaders};
use crate::ports::{KeySetProvider, WebhookVerifier};

use super::{map_jwt_error, resolve_key};

const GOOGLE_ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];

#[derive(Debug, Deserialize)]
struct PushIdentityClaims {
    #[serde(default)]
    email: Option<String>,
}

pub struct GoogleWebhookVerifier {
    keys: Arc<dyn KeySetProvider>,
    audience: String,
}

impl GoogleWebhookVerifier {
    pub fn new(keys: Arc<dyn KeySetProvider>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl WebhookVerifier for GoogleWebhookVerifier {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<VerifiedEvent, WebhookError> {
        let token = headers
            .bearer_token()
            .ok_or(WebhookError::MissingCredentials("authorization"))?;

        let (key, alg) = resolve_key(self.keys.as_ref(), token).await?;

        let mut validation = Validation::new(alg);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(GOOGLE_ISSUERS);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let claims = decode::<PushIdentityClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;
        tracing::debug!(email = ?claims.email, "Verified push identity token");

        let (message_id, notification, payload) = parse_push(body)?;
        Ok(VerifiedEvent {
            provider: Provider::Google,
            event_id: message_id,
            event_type: notification.event_type(),
            payload,
        })
    }
}
