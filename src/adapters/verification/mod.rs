//! Verification adapters for inbound webhooks and upstream lookups.
//!
//! - `StripeWebhookVerifier` - HMAC signature header
//! - `AppleWebhookVerifier` - JWS envelope signed by a key from the provider's key set
//! - `GoogleWebhookVerifier` - OIDC bearer token on the push request
//! - `JwksKeySetProvider` / `StaticKeySet` - signing keys by `kid`
//! - `HttpReceiptVerifier` - store receipt validation service
//! - `HttpCurrencyRateSource` - FX rates

mod apple;
#[cfg(test)]
pub(crate) mod fixtures;
mod fx;
mod google;
mod key_set;
mod receipt;
mod stripe;

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode_header, Algorithm, DecodingKey};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::webhook::WebhookError;
use crate::ports::{KeySetError, KeySetProvider};

pub use apple::AppleWebhookVerifier;
pub use fx::HttpCurrencyRateSource;
pub use google::GoogleWebhookVerifier;
pub use key_set::{JwksKeySetProvider, StaticKeySet};
pub use receipt::HttpReceiptVerifier;
pub use stripe::StripeWebhookVerifier;

/// Outbound HTTP client with a request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, DomainError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("failed to build HTTP client: {}", e),
            )
        })
}

/// Asymmetric algorithms accepted on provider-signed tokens.
const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
];

/// Resolves the verification key named in a compact token's header.
async fn resolve_key(
    keys: &dyn KeySetProvider,
    token: &str,
) -> Result<(DecodingKey, Algorithm), WebhookError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!("Unreadable token header: {}", e);
        WebhookError::InvalidSignature
    })?;
    if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        tracing::warn!(alg = ?header.alg, "Rejected token algorithm");
        return Err(WebhookError::InvalidSignature);
    }
    let kid = header.kid.ok_or_else(|| {
        tracing::warn!("Token missing 'kid' header");
        WebhookError::InvalidSignature
    })?;

    let jwk = keys.find(&kid).await.map_err(|e| match e {
        KeySetError::UnknownKey(kid) => WebhookError::UnknownKey(kid),
        KeySetError::Unavailable(msg) => WebhookError::KeySetUnavailable(msg),
    })?;

    let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
        tracing::warn!("Failed to create decoding key: {}", e);
        WebhookError::InvalidSignature
    })?;
    Ok((decoding_key, header.alg))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> WebhookError {
    match e.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
            WebhookError::TimestampOutOfRange
        }
        _ => {
            tracing::debug!("Token validation failed: {}", e);
            WebhookError::InvalidSignature
        }
    }
}
