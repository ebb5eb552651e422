//! Inbox records for received webhooks.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::Provider;

/// Header values relevant to webhook verification, keyed by lower-case name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    entries: Vec<(String, String)>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header; names are case-insensitive.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_ascii_lowercase(), value.into()));
    }

    /// First value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.get("authorization")
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A webhook whose authenticity has been established.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedEvent {
    pub provider: Provider,
    /// Provider-unique id (`evt_...`, `notificationUUID`, Pub/Sub `messageId`).
    pub event_id: String,
    pub event_type: String,
    /// Decoded payload the sweep dispatches on.
    pub payload: serde_json::Value,
}

/// Durable inbox row. Unique on `(provider, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: Provider,
    pub event_id: String,
    pub event_type: String,
    /// Request body exactly as received.
    pub raw_payload: String,
    /// Decoded payload (JWS middle segment, Pub/Sub data, or the Stripe body).
    pub payload: serde_json::Value,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    /// Set when the sweep gave up on the event; `processed_at` stays empty.
    pub failed_at: Option<Timestamp>,
    /// Processing attempts made by the sweep.
    pub attempts: i32,
    pub last_error: Option<String>,
}

impl WebhookEvent {
    /// Builds an unprocessed inbox row from a verified event.
    pub fn received(verified: VerifiedEvent, raw_payload: impl Into<String>, now: Timestamp) -> Self {
        Self {
            provider: verified.provider,
            event_id: verified.event_id,
            event_type: verified.event_type,
            raw_payload: raw_payload.into(),
            payload: verified.payload,
            received_at: now,
            processed_at: None,
            failed_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    /// Still waiting for the sweep.
    pub fn is_open(&self) -> bool {
        !self.is_processed() && !self.is_failed()
    }
}

/// Result of handing a webhook to the inbox.
///
/// Rejection is an error (`WebhookError`), not an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// First delivery, recorded for the sweep.
    Accepted,
    /// Already recorded; acknowledged without further processing.
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let headers = WebhookHeaders::new().with("Stripe-Signature", "t=1,v1=ab");
        assert_eq!(headers.get("stripe-signature"), Some("t=1,v1=ab"));
        assert_eq!(headers.get("STRIPE-SIGNATURE"), Some("t=1,v1=ab"));
        assert_eq!(headers.get("x-other"), None);
    }

    #[test]
    fn bearer_token_strips_scheme() {
        let headers = WebhookHeaders::new().with("Authorization", "Bearer abc.def.ghi");
        assert_eq!(headers.bearer_token(), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_blank() {
        assert_eq!(
            WebhookHeaders::new().with("authorization", "Basic Zm9v").bearer_token(),
            None
        );
        assert_eq!(
            WebhookHeaders::new().with("authorization", "Bearer   ").bearer_token(),
            None
        );
    }

    #[test]
    fn received_event_starts_unprocessed() {
        let event = WebhookEvent::received(
            VerifiedEvent {
                provider: Provider::Stripe,
                event_id: "evt_1".into(),
                event_type: "invoice.paid".into(),
                payload: serde_json::json!({"id": "evt_1"}),
            },
            r#"{"id":"evt_1"}"#,
            Timestamp::now(),
        );
        assert!(!event.is_processed());
        assert_eq!(event.attempts, 0);
    }
}
