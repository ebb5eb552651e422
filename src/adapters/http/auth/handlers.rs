//! HTTP handlers for session token endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::middleware::{auth_error_response, RequireAuth};
use crate::application::handlers::auth::{
    LogoutCommand, LogoutHandler, RefreshSessionCommand, RefreshSessionHandler,
};
use crate::domain::foundation::Timestamp;

use super::dto::{LogoutRequest, RefreshRequest, TokenPairResponse};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AuthHandlers {
    refresh_handler: Arc<RefreshSessionHandler>,
    logout_handler: Arc<LogoutHandler>,
}

impl AuthHandlers {
    pub fn new(refresh_handler: Arc<RefreshSessionHandler>, logout_handler: Arc<LogoutHandler>) -> Self {
        Self {
            refresh_handler,
            logout_handler,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /auth/refresh - Rotate a refresh token
///
/// The old refresh token is revoked before the new pair is returned; when
/// revocation cannot be recorded the caller gets 503 and no tokens.
pub async fn refresh(
    State(handlers): State<AuthHandlers>,
    Json(req): Json<RefreshRequest>,
) -> Response {
    let cmd = RefreshSessionCommand {
        refresh_token: req.refresh_token,
    };

    match handlers.refresh_handler.handle(cmd, Timestamp::now()).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(e) => auth_error_response(&e),
    }
}

/// POST /auth/logout - Revoke the presented access token
pub async fn logout(
    State(handlers): State<AuthHandlers>,
    RequireAuth(ctx): RequireAuth,
    body: Option<Json<LogoutRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let cmd = LogoutCommand {
        refresh_token: req.refresh_token,
    };

    match handlers.logout_handler.handle(&ctx, cmd, Timestamp::now()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => auth_error_response(&e),
    }
}
