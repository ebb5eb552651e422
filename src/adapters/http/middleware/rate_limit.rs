//! Rate limiting middleware for axum.
//!
//! This module provides middleware that enforces rate limits using the `RateLimiter` port.
//!
//! # Architecture
//!
//! Each route class (auth refresh, polling, webhook ingress, default) gets
//! its own layer instance carrying its `RoutePolicy`: the bucket tuning, how
//! the key is derived and what to do when the limiter backend is down.
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Bucket capacity
//! - `X-RateLimit-Remaining`: Whole tokens left
//! - `Retry-After`: Seconds until the next token (only on 429 response)
//!
//! # Example
//!
//! ```ignore
//! let state = RateLimitState::new(limiter, RouteClass::Polling, config.policy(RouteClass::Polling).clone(), false);
//!
//! let app = Router::new()
//!     .route("/subscriptions/me", get(handler))
//!     .layer(middleware::from_fn_with_state(state, rate_limit_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::{FailMode, KeyStrategy, RouteClass, RoutePolicy};
use crate::domain::foundation::{RequestContext, UserId};
use crate::ports::{RateLimitKey, RateLimitResult, RateLimiter};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Bucket capacity.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Whole tokens left after this request.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
}

/// Rate limiter middleware state for one route class.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<dyn RateLimiter>,
    class: RouteClass,
    policy: RoutePolicy,
    trust_forwarded_for: bool,
}

impl RateLimitState {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        class: RouteClass,
        policy: RoutePolicy,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            limiter,
            class,
            policy,
            trust_forwarded_for,
        }
    }
}

/// Rate limiting middleware for one route class.
///
/// This middleware:
/// 1. Derives the bucket key from the route's key strategy
/// 2. Takes a token from the bucket under the route's policy
/// 3. Returns 429 with `Retry-After` when the bucket is empty
/// 4. On limiter failure, lets the request through (fail open) or returns
///    503 (fail closed), per the route's fail mode
/// 5. Adds rate limit headers to admitted responses
///
/// Keys by user read the `RequestContext`, so on authenticated routes this
/// layer must sit inside the auth layer.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(
        request.headers(),
        connect_info.as_ref(),
        state.trust_forwarded_for,
    );
    let user = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.user_id.clone());
    let key = derive_key(state.policy.key, state.class, &client_ip, user.as_ref());

    let status = match state.limiter.check(&key, state.policy.bucket()).await {
        Ok(RateLimitResult::Allowed(status)) => Some(status),
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::info!(
                route = state.class.as_str(),
                scope = %denied.scope,
                retry_after_secs = denied.retry_after_secs,
                "Rate limit exceeded"
            );
            return rate_limit_response(denied.limit, denied.retry_after_secs);
        }
        Err(e) => match state.policy.fail_mode {
            FailMode::Open => {
                tracing::warn!(route = state.class.as_str(), "Rate limiter unavailable, allowing: {}", e);
                None
            }
            FailMode::Closed => {
                tracing::error!(route = state.class.as_str(), "Rate limiter unavailable, rejecting: {}", e);
                return limiter_unavailable_response();
            }
        },
    };

    let mut response = next.run(request).await;
    if let Some(status) = status {
        add_rate_limit_headers(&mut response, status.limit, status.remaining);
    }
    response
}

/// Bucket key for a request.
///
/// User strategies fall back to the client address for anonymous callers.
pub fn derive_key(
    strategy: KeyStrategy,
    class: RouteClass,
    client_ip: &str,
    user: Option<&UserId>,
) -> RateLimitKey {
    let by_user = || match user {
        Some(user) => RateLimitKey::user(user),
        None => RateLimitKey::ip(client_ip),
    };
    match strategy {
        KeyStrategy::Ip => RateLimitKey::ip(client_ip),
        KeyStrategy::User => by_user(),
        KeyStrategy::Endpoint => RateLimitKey::endpoint(class.as_str()),
        KeyStrategy::IpEndpoint => RateLimitKey::ip(client_ip).on(class.as_str()),
        KeyStrategy::UserEndpoint => by_user().on(class.as_str()),
    }
}

/// Extract the client address.
///
/// The first `X-Forwarded-For` hop is used only behind a trusted proxy;
/// otherwise the socket address decides. Requests with neither share the
/// `unknown` bucket.
fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Create a 429 Too Many Requests response.
fn rate_limit_response(limit: u32, retry_after_secs: u32) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Rate limit exceeded",
            "code": "RATE_LIMITED",
            "retry_after_secs": retry_after_secs
        })),
    )
        .into_response();

    add_rate_limit_headers(&mut response, limit, 0);
    response
        .headers_mut()
        .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

fn limiter_unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "Service temporarily unavailable",
            "code": "SERVICE_UNAVAILABLE"
        })),
    )
        .into_response()
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32) {
    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
}
