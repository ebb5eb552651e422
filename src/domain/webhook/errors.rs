//! Webhook error types.
//!
//! Every verification failure collapses to a detail-free 401 at the edge;
//! the variants exist for logs and tests.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCategory, ErrorCode};

/// Errors that occur during webhook receipt and processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Path named a provider we do not accept.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Signature, token or envelope verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature header or bearer token missing.
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// Signed timestamp is outside the acceptable window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// No key in the provider's key set matches the envelope's key id.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Provider key set could not be fetched.
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Referenced subscription could not be found.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Attempted state transition is not valid.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Optimistic lock lost to a concurrent writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Downstream service (receipt verifier, cache) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl WebhookError {
    /// Returns true if a later attempt may succeed.
    ///
    /// On receipt this decides whether the provider is asked to redeliver;
    /// during the sweep it decides whether the event stays unprocessed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_)
                | WebhookError::Upstream(_)
                | WebhookError::Conflict(_)
                | WebhookError::KeySetUnavailable(_)
                // Might be eventual consistency
                | WebhookError::SubscriptionNotFound(_)
        )
    }

    /// True for every failure that means "this request is not authentic".
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::MissingCredentials(_)
                | WebhookError::TimestampOutOfRange
                | WebhookError::UnknownKey(_)
        )
    }

    /// Maps the error to an HTTP status code for the receiving endpoint.
    ///
    /// - 2xx: acknowledged, provider stops retrying
    /// - 401: not authentic, no detail
    /// - 5xx: provider will retry
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature
            | WebhookError::MissingCredentials(_)
            | WebhookError::TimestampOutOfRange
            | WebhookError::UnknownKey(_) => StatusCode::UNAUTHORIZED,

            WebhookError::UnknownProvider(_) => StatusCode::NOT_FOUND,

            WebhookError::ParseError(_) | WebhookError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }

            WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::KeySetUnavailable(_) | WebhookError::Upstream(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            WebhookError::SubscriptionNotFound(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::Conflict(_)
            | WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match (err.code, err.category()) {
            (ErrorCode::ConcurrencyConflict, _) => WebhookError::Conflict(err.message),
            (ErrorCode::ExternalUnavailable, _) | (ErrorCode::CacheError, _) => {
                WebhookError::Upstream(err.message)
            }
            (_, ErrorCategory::NotFound) => WebhookError::SubscriptionNotFound(err.message),
            (_, ErrorCategory::Conflict) => WebhookError::InvalidTransition(err.message),
            (_, ErrorCategory::Validation) => WebhookError::ParseError(err.message),
            _ => WebhookError::Database(err.message),
        }
    }
}
