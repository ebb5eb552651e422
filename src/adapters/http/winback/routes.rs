//! HTTP routes for winback endpoints.

use axum::{routing::post, Router};

use super::handlers::{accept_offer, decline_offer, WinbackHandlers};

/// Creates the winback router, mounted at `/winback`.
pub fn winback_routes(handlers: WinbackHandlers) -> Router {
    Router::new()
        .route("/:id/accept", post(accept_offer))
        .route("/:id/decline", post(decline_offer))
        .with_state(handlers)
}
