//! HTTP handlers for webhook ingress.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::adapters::http::error::ErrorResponse;
use crate::application::handlers::webhook::{ReceiveWebhookCommand, ReceiveWebhookHandler};
use crate::domain::foundation::Timestamp;
use crate::domain::webhook::{ReceiveOutcome, WebhookError, WebhookHeaders};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WebhookHandlers {
    receive_handler: Arc<ReceiveWebhookHandler>,
}

impl WebhookHandlers {
    pub fn new(receive_handler: Arc<ReceiveWebhookHandler>) -> Self {
        Self { receive_handler }
    }
}

/// Body of every verified delivery, new or repeated.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

impl From<ReceiveOutcome> for WebhookAck {
    fn from(outcome: ReceiveOutcome) -> Self {
        Self {
            received: true,
            duplicate: outcome == ReceiveOutcome::Duplicate,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /webhook/:provider - Verify and record a provider notification
///
/// A verified delivery is always answered 200, duplicates included, so the
/// provider stops retrying it.
pub async fn receive_webhook(
    State(handlers): State<WebhookHandlers>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cmd = ReceiveWebhookCommand {
        provider,
        body: body.to_vec(),
        headers: webhook_headers(&headers),
    };

    match handlers.receive_handler.handle(cmd, Timestamp::now()).await {
        Ok(outcome) => (StatusCode::OK, Json(WebhookAck::from(outcome))).into_response(),
        Err(e) => handle_webhook_error(e),
    }
}

/// Copies the request headers that are valid UTF-8.
fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    let mut out = WebhookHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

fn handle_webhook_error(error: WebhookError) -> Response {
    let status = error.status_code();
    let body = match status {
        StatusCode::UNAUTHORIZED => ErrorResponse::new("UNAUTHORIZED", "Unauthorized"),
        StatusCode::NOT_FOUND => ErrorResponse::new("UNKNOWN_PROVIDER", "Unknown provider"),
        StatusCode::BAD_REQUEST => ErrorResponse::bad_request("Malformed webhook payload"),
        StatusCode::SERVICE_UNAVAILABLE => ErrorResponse::unavailable(),
        StatusCode::OK => {
            return (
                StatusCode::OK,
                Json(WebhookAck {
                    received: true,
                    duplicate: false,
                }),
            )
                .into_response()
        }
        _ => {
            tracing::error!("Webhook ingress failed: {}", error);
            ErrorResponse::internal()
        }
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::webhook::webhook_routes;
    use crate::adapters::memory::InMemoryWebhookEventRepository;
    use crate::adapters::verification::StripeWebhookVerifier;
    use crate::domain::webhook::stripe::sign_for_test;
    use crate::ports::WebhookVerifier;
    use axum::{body::Body, http::Request, Router};
    use secrecy::SecretString;
    use tower::ServiceExt;

    const SECRET: &str = "whsec_http_test";
    const PAYLOAD: &str =
        r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{"subscription":"sub_1"}}}"#;

    fn app(events: Arc<InMemoryWebhookEventRepository>) -> Router {
        let verifier: Arc<dyn WebhookVerifier> =
            Arc::new(StripeWebhookVerifier::new(SecretString::new(SECRET.to_string())));
        let handler = ReceiveWebhookHandler::new([verifier], events);
        Router::new().nest("/webhook", webhook_routes(WebhookHandlers::new(Arc::new(handler))))
    }

    fn post(provider: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/webhook/{}", provider));
        if let Some(signature) = signature {
            builder = builder.header("Stripe-Signature", signature);
        }
        builder.body(Body::from(PAYLOAD)).unwrap()
    }

    fn signed() -> String {
        sign_for_test(SECRET, Timestamp::now().as_unix_secs() as i64, PAYLOAD)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn same_event_twice_is_200_both_times_with_one_row() {
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let app = app(events.clone());

        let first = app.clone().oneshot(post("stripe", Some(signed()))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_json(first).await["duplicate"], false);

        let second = app.oneshot(post("stripe", Some(signed()))).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["duplicate"], true);

        assert_eq!(events.len().await, 1);
    }

    #[tokio::test]
    async fn bad_signature_is_401_without_detail() {
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let bogus = format!("t={},v1={}", Timestamp::now().as_unix_secs(), "0".repeat(64));

        let response = app(events.clone()).oneshot(post("stripe", Some(bogus))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Unauthorized");
        assert!(body.get("details").is_none());
        assert!(events.is_empty().await);
    }

    #[tokio::test]
    async fn missing_signature_is_401() {
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let response = app(events).oneshot(post("stripe", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_provider_is_404() {
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let response = app(events).oneshot(post("paypal", Some(signed()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn headers_are_copied_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", "t=1,v1=ab".parse().unwrap());
        let copied = webhook_headers(&headers);
        assert_eq!(copied.get("stripe-signature"), Some("t=1,v1=ab"));
    }
}
