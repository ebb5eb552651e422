//! HTTP routes for session token endpoints.
//!
//! Refresh is reached without an access token, so it lives on its own
//! router; logout sits behind the auth layer.

use axum::{routing::post, Router};

use super::handlers::{logout, refresh, AuthHandlers};

/// `POST /refresh`, mounted under `/auth` without the auth layer.
pub fn refresh_routes(handlers: AuthHandlers) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .with_state(handlers)
}

/// `POST /logout`, mounted under `/auth` behind the auth layer.
pub fn logout_routes(handlers: AuthHandlers) -> Router {
    Router::new()
        .route("/logout", post(logout))
        .with_state(handlers)
}
