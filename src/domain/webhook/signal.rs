//! Normalisation of provider events into lifecycle signals.
//!
//! Each provider names things differently; the sweep only needs to know what
//! happened to which recurring purchase.

use serde_json::Value;

use crate::domain::foundation::Timestamp;

use super::apple::AppleNotification;
use super::google::DeveloperNotification;
use super::{Provider, WebhookError, WebhookEvent};

/// What happened to a subscription, independent of provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// A charge succeeded (first purchase or renewal).
    Renewed,
    /// A renewal charge failed; starts or advances grace and dunning.
    RenewalFailed,
    /// A previously failed renewal was collected.
    Recovered,
    /// The user toggled auto-renew.
    AutoRenewChanged(bool),
    /// Ended immediately.
    Cancelled,
    /// Lapsed, refunded or revoked.
    Expired,
}

/// A normalised lifecycle signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSignal {
    pub kind: SignalKind,
    /// Stripe subscription id, Apple original transaction id, or Google purchase token.
    pub provider_subscription_id: String,
    /// Our user id when the provider carries one.
    pub user_hint: Option<String>,
    pub product_id: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    /// Provider's id for the charge, used for the transaction row.
    pub provider_tx_id: Option<String>,
    pub reason: Option<String>,
}

impl LifecycleSignal {
    fn new(kind: SignalKind, provider_subscription_id: impl Into<String>) -> Self {
        Self {
            kind,
            provider_subscription_id: provider_subscription_id.into(),
            user_hint: None,
            product_id: None,
            expires_at: None,
            amount_cents: None,
            currency: None,
            provider_tx_id: None,
            reason: None,
        }
    }
}

/// Interprets a recorded event.
///
/// # Errors
///
/// - `Ignored` for event types with no lifecycle meaning
/// - `MissingField` / `ParseError` for payloads that do not match their type
pub fn interpret(event: &WebhookEvent) -> Result<LifecycleSignal, WebhookError> {
    match event.provider {
        Provider::Stripe => interpret_stripe(&event.event_type, &event.payload),
        Provider::Apple => {
            let notification: AppleNotification = serde_json::from_value(event.payload.clone())
                .map_err(|e| WebhookError::ParseError(e.to_string()))?;
            interpret_apple(&notification)
        }
        Provider::Google => {
            let notification: DeveloperNotification =
                serde_json::from_value(event.payload.clone())
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
            interpret_google(&notification)
        }
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn i64_at(value: &Value, pointer: &str) -> Option<i64> {
    value.pointer(pointer).and_then(Value::as_i64)
}

fn interpret_stripe(event_type: &str, payload: &Value) -> Result<LifecycleSignal, WebhookError> {
    let object = payload
        .pointer("/data/object")
        .ok_or(WebhookError::MissingField("data.object"))?;

    match event_type {
        "invoice.paid" | "invoice.payment_succeeded" => {
            let sub_id = str_at(object, "/subscription")
                .ok_or(WebhookError::MissingField("subscription"))?;
            let mut signal = LifecycleSignal::new(SignalKind::Renewed, sub_id);
            signal.expires_at = i64_at(object, "/lines/data/0/period/end")
                .or_else(|| i64_at(object, "/period_end"))
                .map(|secs| Timestamp::from_unix_secs(secs.max(0) as u64));
            signal.product_id = str_at(object, "/lines/data/0/price/id")
                .or_else(|| str_at(object, "/lines/data/0/plan/id"))
                .map(str::to_string);
            signal.amount_cents = i64_at(object, "/amount_paid");
            signal.currency = str_at(object, "/currency").map(str::to_string);
            signal.provider_tx_id = str_at(object, "/id").map(str::to_string);
            signal.user_hint = str_at(object, "/subscription_details/metadata/user_id")
                .or_else(|| str_at(object, "/metadata/user_id"))
                .map(str::to_string);
            Ok(signal)
        }
        "invoice.payment_failed" => {
            let sub_id = str_at(object, "/subscription")
                .ok_or(WebhookError::MissingField("subscription"))?;
            let mut signal = LifecycleSignal::new(SignalKind::RenewalFailed, sub_id);
            signal.reason = Some(
                str_at(object, "/last_payment_error/code")
                    .unwrap_or("payment_failed")
                    .to_string(),
            );
            Ok(signal)
        }
        "customer.subscription.deleted" => {
            let sub_id = str_at(object, "/id").ok_or(WebhookError::MissingField("id"))?;
            Ok(LifecycleSignal::new(SignalKind::Cancelled, sub_id))
        }
        "customer.subscription.updated" => {
            let sub_id = str_at(object, "/id").ok_or(WebhookError::MissingField("id"))?;
            let kind = match str_at(object, "/status") {
                Some("past_due") | Some("unpaid") => SignalKind::RenewalFailed,
                _ => {
                    let cancel_at_period_end = object
                        .pointer("/cancel_at_period_end")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    SignalKind::AutoRenewChanged(!cancel_at_period_end)
                }
            };
            let mut signal = LifecycleSignal::new(kind, sub_id);
            signal.expires_at = i64_at(object, "/current_period_end")
                .map(|secs| Timestamp::from_unix_secs(secs.max(0) as u64));
            Ok(signal)
        }
        "checkout.session.completed" => {
            if str_at(object, "/mode") != Some("subscription") {
                return Err(WebhookError::Ignored("checkout is not a subscription".into()));
            }
            let sub_id = str_at(object, "/subscription")
                .ok_or(WebhookError::MissingField("subscription"))?;
            let mut signal = LifecycleSignal::new(SignalKind::Renewed, sub_id);
            signal.user_hint = str_at(object, "/client_reference_id")
                .or_else(|| str_at(object, "/metadata/user_id"))
                .map(str::to_string);
            signal.product_id = str_at(object, "/metadata/product_id").map(str::to_string);
            signal.amount_cents = i64_at(object, "/amount_total");
            signal.currency = str_at(object, "/currency").map(str::to_string);
            signal.provider_tx_id = str_at(object, "/id").map(str::to_string);
            Ok(signal)
        }
        other => Err(WebhookError::Ignored(format!("stripe event type {}", other))),
    }
}

fn interpret_apple(notification: &AppleNotification) -> Result<LifecycleSignal, WebhookError> {
    let kind = match (
        notification.notification_type.as_str(),
        notification.subtype.as_deref(),
    ) {
        ("DID_RENEW", Some("BILLING_RECOVERY")) => SignalKind::Recovered,
        ("SUBSCRIBED", _) | ("DID_RENEW", _) => SignalKind::Renewed,
        ("DID_FAIL_TO_RENEW", _) => SignalKind::RenewalFailed,
        ("GRACE_PERIOD_EXPIRED", _) | ("EXPIRED", _) | ("REFUND", _) | ("REVOKE", _) => {
            SignalKind::Expired
        }
        ("DID_CHANGE_RENEWAL_STATUS", subtype) => {
            SignalKind::AutoRenewChanged(subtype == Some("AUTO_RENEW_ENABLED"))
        }
        (other, _) => {
            return Err(WebhookError::Ignored(format!("apple notification type {}", other)))
        }
    };

    let info = notification
        .transaction_info()?
        .ok_or(WebhookError::MissingField("signedTransactionInfo"))?;

    let mut signal = LifecycleSignal::new(kind, info.original_transaction_id);
    signal.product_id = info.product_id;
    signal.expires_at = info.expires_date.and_then(Timestamp::from_unix_millis);
    signal.user_hint = info.app_account_token;
    // Apple prices are in milli-units.
    signal.amount_cents = info.price.map(|p| p / 10);
    signal.currency = info.currency;
    signal.provider_tx_id = info.transaction_id;
    signal.reason = notification.subtype.clone();
    Ok(signal)
}

fn interpret_google(notification: &DeveloperNotification) -> Result<LifecycleSignal, WebhookError> {
    let sub = match &notification.subscription_notification {
        Some(sub) => sub,
        None => return Err(WebhookError::Ignored(notification.event_type())),
    };

    let kind = match sub.notification_type {
        1 => SignalKind::Recovered,
        2 | 4 => SignalKind::Renewed,
        3 => SignalKind::AutoRenewChanged(false),
        5 | 6 => SignalKind::RenewalFailed,
        7 => SignalKind::AutoRenewChanged(true),
        12 | 13 => SignalKind::Expired,
        other => {
            return Err(WebhookError::Ignored(format!(
                "google subscription notification {}",
                other
            )))
        }
    };

    let mut signal = LifecycleSignal::new(kind, sub.purchase_token.clone());
    signal.product_id = Some(sub.subscription_id.clone());
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::apple::encode_segment;
    use crate::domain::webhook::VerifiedEvent;
    use serde_json::json;

    fn event(provider: Provider, event_type: &str, payload: Value) -> WebhookEvent {
        WebhookEvent::received(
            VerifiedEvent {
                provider,
                event_id: "e".into(),
                event_type: event_type.into(),
                payload,
            },
            "",
            Timestamp::now(),
        )
    }

    fn stripe(event_type: &str, object: Value) -> WebhookEvent {
        event(
            Provider::Stripe,
            event_type,
            json!({"id": "evt_1", "type": event_type, "data": {"object": object}}),
        )
    }

    #[test]
    fn stripe_invoice_paid_is_renewal_with_period_end() {
        let signal = interpret(&stripe(
            "invoice.paid",
            json!({
                "id": "in_1",
                "subscription": "sub_1",
                "amount_paid": 999,
                "currency": "usd",
                "lines": {"data": [{"period": {"end": 1_706_745_600}, "price": {"id": "price_m"}}]}
            }),
        ))
        .unwrap();
        assert_eq!(signal.kind, SignalKind::Renewed);
        assert_eq!(signal.provider_subscription_id, "sub_1");
        assert_eq!(signal.expires_at, Some(Timestamp::from_unix_secs(1_706_745_600)));
        assert_eq!(signal.product_id.as_deref(), Some("price_m"));
        assert_eq!(signal.amount_cents, Some(999));
        assert_eq!(signal.provider_tx_id.as_deref(), Some("in_1"));
    }

    #[test]
    fn stripe_payment_failed_is_renewal_failure() {
        let signal = interpret(&stripe(
            "invoice.payment_failed",
            json!({"subscription": "sub_1"}),
        ))
        .unwrap();
        assert_eq!(signal.kind, SignalKind::RenewalFailed);
        assert_eq!(signal.reason.as_deref(), Some("payment_failed"));
    }

    #[test]
    fn stripe_subscription_updated_maps_cancel_at_period_end() {
        let signal = interpret(&stripe(
            "customer.subscription.updated",
            json!({"id": "sub_1", "status": "active", "cancel_at_period_end": true}),
        ))
        .unwrap();
        assert_eq!(signal.kind, SignalKind::AutoRenewChanged(false));
    }

    #[test]
    fn stripe_deleted_is_cancel() {
        let signal = interpret(&stripe("customer.subscription.deleted", json!({"id": "sub_9"}))).unwrap();
        assert_eq!(signal.kind, SignalKind::Cancelled);
        assert_eq!(signal.provider_subscription_id, "sub_9");
    }

    #[test]
    fn stripe_unknown_type_is_ignored() {
        let result = interpret(&stripe("customer.created", json!({})));
        assert!(matches!(result, Err(WebhookError::Ignored(_))));
    }

    #[test]
    fn stripe_missing_subscription_is_missing_field() {
        let result = interpret(&stripe("invoice.paid", json!({"id": "in_1"})));
        assert!(matches!(result, Err(WebhookError::MissingField("subscription"))));
    }

    fn apple(notification_type: &str, subtype: Option<&str>) -> WebhookEvent {
        let tx = format!(
            "{}.{}.sig",
            encode_segment(&json!({"alg": "ES256"})),
            encode_segment(&json!({
                "originalTransactionId": "otx-1",
                "transactionId": "tx-2",
                "productId": "premium_annual",
                "expiresDate": 1_706_745_600_000i64,
                "price": 49_990,
                "currency": "USD"
            }))
        );
        event(
            Provider::Apple,
            notification_type,
            json!({
                "notificationType": notification_type,
                "subtype": subtype,
                "notificationUUID": "uuid-1",
                "data": {"signedTransactionInfo": tx}
            }),
        )
    }

    #[test]
    fn apple_did_renew_is_renewal_with_expiry() {
        let signal = interpret(&apple("DID_RENEW", None)).unwrap();
        assert_eq!(signal.kind, SignalKind::Renewed);
        assert_eq!(signal.provider_subscription_id, "otx-1");
        assert_eq!(signal.expires_at, Timestamp::from_unix_millis(1_706_745_600_000));
        assert_eq!(signal.amount_cents, Some(4_999));
    }

    #[test]
    fn apple_billing_recovery_is_recovered() {
        let signal = interpret(&apple("DID_RENEW", Some("BILLING_RECOVERY"))).unwrap();
        assert_eq!(signal.kind, SignalKind::Recovered);
    }

    #[test]
    fn apple_renewal_status_maps_subtype() {
        assert_eq!(
            interpret(&apple("DID_CHANGE_RENEWAL_STATUS", Some("AUTO_RENEW_DISABLED")))
                .unwrap()
                .kind,
            SignalKind::AutoRenewChanged(false)
        );
        assert_eq!(
            interpret(&apple("DID_CHANGE_RENEWAL_STATUS", Some("AUTO_RENEW_ENABLED")))
                .unwrap()
                .kind,
            SignalKind::AutoRenewChanged(true)
        );
    }

    #[test]
    fn apple_refund_and_revoke_expire() {
        assert_eq!(interpret(&apple("REFUND", None)).unwrap().kind, SignalKind::Expired);
        assert_eq!(interpret(&apple("REVOKE", None)).unwrap().kind, SignalKind::Expired);
    }

    #[test]
    fn apple_consumption_request_is_ignored() {
        assert!(matches!(
            interpret(&apple("CONSUMPTION_REQUEST", None)),
            Err(WebhookError::Ignored(_))
        ));
    }

    fn google(notification_type: i32) -> WebhookEvent {
        event(
            Provider::Google,
            &format!("subscription.{}", notification_type),
            json!({
                "subscriptionNotification": {
                    "notificationType": notification_type,
                    "purchaseToken": "tok-1",
                    "subscriptionId": "premium_monthly"
                }
            }),
        )
    }

    #[test]
    fn google_codes_map_to_signals() {
        let cases = [
            (1, SignalKind::Recovered),
            (2, SignalKind::Renewed),
            (3, SignalKind::AutoRenewChanged(false)),
            (4, SignalKind::Renewed),
            (5, SignalKind::RenewalFailed),
            (6, SignalKind::RenewalFailed),
            (7, SignalKind::AutoRenewChanged(true)),
            (12, SignalKind::Expired),
            (13, SignalKind::Expired),
        ];
        for (code, kind) in cases {
            let signal = interpret(&google(code)).unwrap();
            assert_eq!(signal.kind, kind, "code {}", code);
            assert_eq!(signal.provider_subscription_id, "tok-1");
        }
    }

    #[test]
    fn google_test_notification_is_ignored() {
        let e = event(Provider::Google, "test", json!({"testNotification": {"version": "1.0"}}));
        assert!(matches!(interpret(&e), Err(WebhookError::Ignored(_))));
    }
}
