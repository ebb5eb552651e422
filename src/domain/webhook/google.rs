//! Google-style Pub/Sub push notifications.
//!
//! The request body wraps a base64 `data` field holding the developer
//! notification. Authenticity comes from the bearer token on the request,
//! not from the body.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use super::WebhookError;

#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Base64 (standard alphabet) developer notification.
    pub data: String,
    #[serde(rename = "messageId", alias = "message_id")]
    pub message_id: String,
    #[serde(rename = "publishTime", alias = "publish_time", default)]
    pub publish_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperNotification {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    /// Milliseconds since the epoch, sent as a string.
    #[serde(default)]
    pub event_time_millis: Option<String>,
    #[serde(default)]
    pub subscription_notification: Option<SubscriptionNotification>,
    #[serde(default)]
    pub test_notification: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionNotification {
    pub notification_type: i32,
    pub purchase_token: String,
    /// Product id of the subscription.
    pub subscription_id: String,
}

impl DeveloperNotification {
    /// Event type used in the inbox: `subscription.<n>` or `test`.
    pub fn event_type(&self) -> String {
        match &self.subscription_notification {
            Some(sub) => format!("subscription.{}", sub.notification_type),
            None if self.test_notification.is_some() => "test".to_string(),
            None => "other".to_string(),
        }
    }
}

/// Parses a push body into `(message_id, notification, notification_json)`.
///
/// # Errors
///
/// `ParseError` for malformed envelopes or undecodable data.
pub fn parse_push(
    body: &[u8],
) -> Result<(String, DeveloperNotification, serde_json::Value), WebhookError> {
    let envelope: PushEnvelope =
        serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))?;
    if envelope.message.message_id.trim().is_empty() {
        return Err(WebhookError::MissingField("messageId"));
    }
    let decoded = STANDARD
        .decode(envelope.message.data.trim())
        .map_err(|e| WebhookError::ParseError(format!("invalid base64 data: {}", e)))?;
    let json: serde_json::Value =
        serde_json::from_slice(&decoded).map_err(|e| WebhookError::ParseError(e.to_string()))?;
    let notification: DeveloperNotification = serde_json::from_value(json.clone())
        .map_err(|e| WebhookError::ParseError(e.to_string()))?;
    Ok((envelope.message.message_id, notification, json))
}
