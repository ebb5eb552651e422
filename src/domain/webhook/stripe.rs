//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over `"{t}.{body}"` with the endpoint's signing secret, plus a
//! timestamp window against replay.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{Provider, VerifiedEvent, WebhookError, WebhookHeaders};

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components from the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// All v1 signatures; Stripe sends several while a secret is rolling.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>[,v1=<signature>...]`
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` if the header format is invalid.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {
                    // v0 and future schemes are ignored
                }
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Fields of a Stripe event envelope we read.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,
}

/// Verifier for Stripe webhook signatures.
pub struct StripeSignatureVerifier {
    secret: SecretString,
}

impl StripeSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature and extracts the event identity.
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` - no Stripe-Signature header
    /// - `InvalidSignature` - no v1 signature matches
    /// - `TimestampOutOfRange` - signed more than 5 minutes ago or too far ahead
    /// - `ParseError` - malformed header or body
    pub fn verify(
        &self,
        payload: &[u8],
        headers: &WebhookHeaders,
        now_unix: i64,
    ) -> Result<VerifiedEvent, WebhookError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or(WebhookError::MissingCredentials(SIGNATURE_HEADER))?;
        let header = SignatureHeader::parse(header)?;

        validate_timestamp(header.timestamp, now_unix)?;

        let expected = self.compute_signature(header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let body: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        Ok(VerifiedEvent {
            provider: Provider::Stripe,
            event_id: event.id,
            event_type: event.event_type,
            payload: body,
        })
    }

    /// Computes the HMAC-SHA256 signature for the given timestamp and payload.
    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Validates that the timestamp is within acceptable bounds.
fn validate_timestamp(timestamp: i64, now_unix: i64) -> Result<(), WebhookError> {
    let age = now_unix - timestamp;
    if age > MAX_EVENT_AGE_SECS || age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    Ok(())
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid `Stripe-Signature` header value for test fixtures.
#[cfg(test)]
pub fn sign_for_test(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_704_067_200;

    fn verifier(secret: &str) -> StripeSignatureVerifier {
        StripeSignatureVerifier::new(SecretString::new(secret.to_string()))
    }

    fn headers(value: String) -> WebhookHeaders {
        WebhookHeaders::new().with("Stripe-Signature", value)
    }

    const PAYLOAD: &str = r#"{"id":"evt_1","type":"invoice.paid","created":1704067200,"data":{"object":{"subscription":"sub_1"}},"livemode":false}"#;

    #[test]
    fn parse_header_with_v1_only() {
        let header = SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_keeps_every_v1() {
        let header = SignatureHeader::parse(&format!(
            "t=1,v1={},v1={},v0={}",
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(64)
        ))
        .unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_missing_parts_fails() {
        assert!(matches!(
            SignatureHeader::parse(&format!("v1={}", "a".repeat(64))),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=1234567890"),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=1,v1=not_hex"),
            Err(WebhookError::ParseError(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t1234567890"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn verify_valid_signature_extracts_identity() {
        let sig = sign_for_test(TEST_SECRET, NOW, PAYLOAD);
        let event = verifier(TEST_SECRET)
            .verify(PAYLOAD.as_bytes(), &headers(sig), NOW)
            .unwrap();
        assert_eq!(event.provider, Provider::Stripe);
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, "invoice.paid");
        assert_eq!(event.payload["data"]["object"]["subscription"], "sub_1");
    }

    #[test]
    fn verify_accepts_any_matching_v1_during_secret_roll() {
        let good = sign_for_test(TEST_SECRET, NOW, PAYLOAD);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "0".repeat(64), good_sig);
        assert!(verifier(TEST_SECRET)
            .verify(PAYLOAD.as_bytes(), &headers(header), NOW)
            .is_ok());
    }

    #[test]
    fn verify_wrong_secret_fails() {
        let sig = sign_for_test(TEST_SECRET, NOW, PAYLOAD);
        let result = verifier("wrong_secret").verify(PAYLOAD.as_bytes(), &headers(sig), NOW);
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn verify_tampered_payload_fails() {
        let sig = sign_for_test(TEST_SECRET, NOW, PAYLOAD);
        let tampered = PAYLOAD.replace("evt_1", "evt_2");
        let result = verifier(TEST_SECRET).verify(tampered.as_bytes(), &headers(sig), NOW);
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn verify_missing_header_fails() {
        let result = verifier(TEST_SECRET).verify(PAYLOAD.as_bytes(), &WebhookHeaders::new(), NOW);
        assert!(matches!(result, Err(WebhookError::MissingCredentials(_))));
    }

    #[test]
    fn timestamp_window_boundaries() {
        assert!(validate_timestamp(NOW - 300, NOW).is_ok());
        assert!(matches!(
            validate_timestamp(NOW - 301, NOW),
            Err(WebhookError::TimestampOutOfRange)
        ));
        assert!(validate_timestamp(NOW + 60, NOW).is_ok());
        assert!(matches!(
            validate_timestamp(NOW + 61, NOW),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn verify_signed_but_invalid_json_fails_to_parse() {
        let payload = "not valid json";
        let sig = sign_for_test(TEST_SECRET, NOW, payload);
        let result = verifier(TEST_SECRET).verify(payload.as_bytes(), &headers(sig), NOW);
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn constant_time_compare_cases() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}
