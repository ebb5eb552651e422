//! HTTP routes for subscription endpoints.
//!
//! The status read is polled by clients and gets the polling rate limit;
//! the commands use the default one.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{cancel_subscription, get_my_subscription, submit_receipt, SubscriptionHandlers};

/// `GET /me`, mounted under `/subscriptions`.
pub fn polling_routes(handlers: SubscriptionHandlers) -> Router {
    Router::new()
        .route("/me", get(get_my_subscription))
        .with_state(handlers)
}

/// `POST /receipt` and `POST /cancel`, mounted under `/subscriptions`.
pub fn command_routes(handlers: SubscriptionHandlers) -> Router {
    Router::new()
        .route("/receipt", post(submit_receipt))
        .route("/cancel", post(cancel_subscription))
        .with_state(handlers)
}
