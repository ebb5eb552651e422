//! Apple-style signed notifications.
//!
//! The body is `{"signedPayload": "<JWS>"}`. The JWS header names the signing
//! key (`kid`); the notification itself is the base64url middle segment.
//! Transaction and renewal details are nested JWS strings whose payloads are
//! read the same way once the outer envelope has been verified.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::WebhookError;

/// Header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// The three segments of a compact JWS, borrowed from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactJws<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl<'a> CompactJws<'a> {
    /// Splits `header.payload.signature`.
    ///
    /// # Errors
    ///
    /// `ParseError` unless there are exactly three non-empty segments.
    pub fn split(token: &'a str) -> Result<Self, WebhookError> {
        let mut parts = token.trim().split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                Ok(Self {
                    header: h,
                    payload: p,
                    signature: s,
                })
            }
            _ => Err(WebhookError::ParseError("malformed JWS".to_string())),
        }
    }

    pub fn decode_header(&self) -> Result<JwsHeader, WebhookError> {
        decode_segment(self.header)
    }

    /// Decodes the middle segment.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, WebhookError> {
        decode_segment(self.payload)
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, WebhookError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| WebhookError::ParseError(format!("invalid base64url: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| WebhookError::ParseError(e.to_string()))
}

/// Request body of a signed notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedNotificationBody {
    pub signed_payload: String,
}

/// Decoded notification (payload of `signedPayload`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleNotification {
    pub notification_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(rename = "notificationUUID")]
    pub notification_uuid: String,
    #[serde(default)]
    pub data: Option<AppleNotificationData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleNotificationData {
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub signed_transaction_info: Option<String>,
    #[serde(default)]
    pub signed_renewal_info: Option<String>,
}

/// Decoded `signedTransactionInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleTransactionInfo {
    pub original_transaction_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub expires_date: Option<i64>,
    /// Our user id, set by the app at purchase time.
    #[serde(default)]
    pub app_account_token: Option<String>,
    /// Milli-units of the currency (Apple's convention).
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Decoded `signedRenewalInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleRenewalInfo {
    #[serde(default)]
    pub auto_renew_status: Option<i32>,
}

impl AppleNotification {
    /// Reads the nested transaction info, if present.
    pub fn transaction_info(&self) -> Result<Option<AppleTransactionInfo>, WebhookError> {
        match self.data.as_ref().and_then(|d| d.signed_transaction_info.as_deref()) {
            Some(jws) => Ok(Some(CompactJws::split(jws)?.decode_payload()?)),
            None => Ok(None),
        }
    }

    /// Reads the nested renewal info, if present.
    pub fn renewal_info(&self) -> Result<Option<AppleRenewalInfo>, WebhookError> {
        match self.data.as_ref().and_then(|d| d.signed_renewal_info.as_deref()) {
            Some(jws) => Ok(Some(CompactJws::split(jws)?.decode_payload()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_segment(value: &serde_json::Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}
