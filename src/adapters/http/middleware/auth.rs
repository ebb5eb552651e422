//! Authentication middleware and extractors for axum.
//!
//! This module provides:
//! - `auth_middleware` - Layer that validates Bearer tokens and injects a `RequestContext`
//! - `RequireAuth` - Extractor handing the `RequestContext` to handlers
//!
//! # Architecture
//!
//! The middleware uses the `SessionValidator` port, so the same layer runs
//! against the revocation-aware JWT validator in production and a mock in
//! tests.
//!
//! ```text
//! Request → auth_middleware → injects RequestContext into extensions
//!                                      ↓
//!                              Handler → RequireAuth extractor reads from extensions
//! ```
//!
//! The layer fails closed: a missing token, any validation failure and an
//! unreachable revocation store all stop the request before the handler.
//! Response bodies carry only a stable code, never the reason a check failed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::domain::foundation::{AuthError, RequestContext};
use crate::ports::SessionValidator;

use super::REQUEST_ID_HEADER;

/// Auth middleware state - wraps the session validator.
pub type AuthState = Arc<dyn SessionValidator>;

/// Authentication middleware that validates Bearer tokens.
///
/// This middleware:
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Validates the token (signature, expiry, kind, revocation) via the port
/// 3. On success, injects `RequestContext` carrying the request id
/// 4. On a missing or rejected token, returns 401 with a fixed body
/// 5. When the revocation store cannot be consulted, returns 503
pub async fn auth_middleware(
    State(validator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return AuthRejection::Unauthenticated.into_response();
    };

    match validator.validate(token).await {
        Ok(session) => {
            let request_id = request_id(request.headers());
            request.extensions_mut().insert(session.into_context(request_id));
            next.run(request).await
        }
        Err(e) => {
            if let AuthError::ServiceUnavailable(msg) = &e {
                tracing::error!("Auth service unavailable: {}", msg);
            } else {
                tracing::debug!(code = e.code(), "Rejected bearer token");
            }
            AuthRejection::Rejected(e).into_response()
        }
    }
}

/// Bearer token from the Authorization header, without the prefix.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Request id set by the request-id layer, or a fresh one.
pub(crate) fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Extractor that requires authentication.
///
/// Reads the `RequestContext` that `auth_middleware` stored. Routes without
/// the middleware never have one, so the extractor rejects with 401.
///
/// # Example
///
/// ```ignore
/// async fn my_handler(RequireAuth(ctx): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", ctx.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No bearer token was provided.
    Unauthenticated,
    /// The token was presented and refused.
    Rejected(AuthError),
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthRejection::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthRejection::Rejected(e) => auth_status(e),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthRejection::Unauthenticated => "UNAUTHENTICATED",
            AuthRejection::Rejected(e) => e.code(),
        }
    }
}

/// Status for an auth failure: 503 when undecidable, 403 for permissions, else 401.
pub(crate) fn auth_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    }
}

/// Fixed body for an auth failure.
pub(crate) fn auth_error_response(error: &AuthError) -> Response {
    AuthRejection::Rejected(error.clone()).into_response()
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self.status() {
            StatusCode::SERVICE_UNAVAILABLE => "Authentication service unavailable",
            StatusCode::FORBIDDEN => "Forbidden",
            _ => "Authentication required",
        };

        (
            self.status(),
            Json(serde_json::json!({
                "error": message,
                "code": self.code()
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockSessionValidator;
    use crate::domain::foundation::{AuthenticatedSession, Role, Timestamp, UserId};
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn session() -> AuthenticatedSession {
        AuthenticatedSession {
            user_id: UserId::new("user-123").unwrap(),
            role: Role::User,
            jti: "jti-1".to_string(),
            expires_at: Timestamp::from_unix_secs(2_000_000_000),
        }
    }

    async fn whoami(RequireAuth(ctx): RequireAuth) -> String {
        format!("{}|{}", ctx.user_id, ctx.request_id)
    }

    fn app(validator: MockSessionValidator) -> Router {
        let state: AuthState = Arc::new(validator);
        Router::new()
            .route("/me", get(whoami))
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    fn get_with(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder()
            .uri("/me")
            .header(REQUEST_ID_HEADER, "req-7");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Middleware
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn valid_token_reaches_handler_with_context() {
        let app = app(MockSessionValidator::new().with_session("good", session()));

        let response = app.oneshot(get_with(Some("good"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"user-123|req-7");
    }

    #[tokio::test]
    async fn missing_token_is_401() {
        let response = app(MockSessionValidator::new())
            .oneshot(get_with(None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn revoked_token_is_401_with_code_only() {
        let app = app(MockSessionValidator::new().with_error(AuthError::TokenRevoked));

        let response = app.oneshot(get_with(Some("revoked"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "TOKEN_REVOKED");
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn unreachable_revocation_store_fails_closed() {
        let app = app(
            MockSessionValidator::new().with_error(AuthError::service_unavailable("redis down")),
        );

        let response = app.oneshot(get_with(Some("any"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
        assert!(!body.to_string().contains("redis"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // RequireAuth Extractor
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn require_auth_fails_without_context() {
        let request: axum::http::Request<()> =
            axum::http::Request::builder().uri("/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let result = RequireAuth::from_request_parts(&mut parts, &()).await;

        assert!(matches!(result, Err(AuthRejection::Unauthenticated)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer my-secret-token".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("my-secret-token"));

        headers.insert("Authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("Authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn request_id_is_generated_when_absent() {
        let id = request_id(&HeaderMap::new());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn insufficient_permissions_is_403() {
        assert_eq!(
            auth_status(&AuthError::InsufficientPermissions),
            StatusCode::FORBIDDEN
        );
        assert_eq!(auth_status(&AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn auth_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthState>();
        assert_send_sync::<RequireAuth>();
    }
}
