//! HTTP routes for webhook ingress.

use axum::{routing::post, Router};

use super::handlers::{receive_webhook, WebhookHandlers};

/// Creates the webhook router, mounted at `/webhook`.
pub fn webhook_routes(handlers: WebhookHandlers) -> Router {
    Router::new()
        .route("/:provider", post(receive_webhook))
        .with_state(handlers)
}
