//! HTTP adapters - REST API implementations.
//!
//! Each area has its own adapter (handlers, DTOs, routes); this module
//! assembles them behind the shared layers:
//!
//! ```text
//! request-id → trace → propagate request-id → timeout → CORS
//!     → [auth] → rate limit (per route class) → handler
//! ```
//!
//! | Route                          | Auth | Rate limit class  |
//! |--------------------------------|------|-------------------|
//! | `POST /webhook/:provider`      | no   | `webhook_ingress` |
//! | `POST /auth/refresh`           | no   | `auth_refresh`    |
//! | `POST /auth/logout`            | yes  | `default`         |
//! | `GET /subscriptions/me`        | yes  | `polling`         |
//! | `POST /subscriptions/receipt`  | yes  | `default`         |
//! | `POST /subscriptions/cancel`   | yes  | `default`         |
//! | `POST /winback/:id/accept`     | yes  | `default`         |
//! | `POST /winback/:id/decline`    | yes  | `default`         |
//! | `GET /health`                  | no   | none              |

pub mod auth;
pub mod error;
pub mod health;
pub mod middleware;
pub mod subscription;
pub mod webhook;
pub mod winback;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::from_fn_with_state,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{RateLimitsConfig, RouteClass};
use crate::ports::RateLimiter;

pub use auth::AuthHandlers;
pub use error::{ApiError, ErrorResponse};
pub use middleware::{AuthState, RateLimitState, RequireAuth, REQUEST_ID_HEADER};
pub use subscription::SubscriptionHandlers;
pub use webhook::WebhookHandlers;
pub use winback::WinbackHandlers;

/// Everything the router needs.
#[derive(Clone)]
pub struct ApiState {
    pub webhook: WebhookHandlers,
    pub auth: AuthHandlers,
    pub subscriptions: SubscriptionHandlers,
    pub winback: WinbackHandlers,
    pub validator: AuthState,
    pub limiter: Arc<dyn RateLimiter>,
    pub rate_limits: RateLimitsConfig,
    pub trust_forwarded_for: bool,
}

/// Router-wide settings from the server config.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub request_timeout: Duration,
    /// Empty means no cross-origin access.
    pub cors_origins: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiState {
    /// Wraps `router` in the rate limit for `class`, if limits are enabled.
    fn limited(&self, router: Router, class: RouteClass) -> Router {
        if !self.rate_limits.enabled {
            return router;
        }
        let state = RateLimitState::new(
            self.limiter.clone(),
            class,
            self.rate_limits.policy(class).clone(),
            self.trust_forwarded_for,
        );
        router.layer(from_fn_with_state(state, middleware::rate_limit_middleware))
    }

    /// Rate limit inside, auth outside, so user-keyed buckets see the caller.
    fn protected(&self, router: Router, class: RouteClass) -> Router {
        self.limited(router, class).layer(from_fn_with_state(
            self.validator.clone(),
            middleware::auth_middleware,
        ))
    }
}

/// Builds the complete API router.
pub fn api_router(state: ApiState, options: &RouterOptions) -> Router {
    let webhook = state.limited(
        webhook::webhook_routes(state.webhook.clone()),
        RouteClass::WebhookIngress,
    );
    let auth = state
        .limited(auth::refresh_routes(state.auth.clone()), RouteClass::AuthRefresh)
        .merge(state.protected(auth::logout_routes(state.auth.clone()), RouteClass::Default));
    let subscriptions = state
        .protected(
            subscription::polling_routes(state.subscriptions.clone()),
            RouteClass::Polling,
        )
        .merge(state.protected(
            subscription::command_routes(state.subscriptions.clone()),
            RouteClass::Default,
        ));
    let winback = state.protected(
        winback::winback_routes(state.winback.clone()),
        RouteClass::Default,
    );

    Router::new()
        .nest("/webhook", webhook)
        .nest("/auth", auth)
        .nest("/subscriptions", subscriptions)
        .nest("/winback", winback)
        .merge(health::health_routes())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(options.request_timeout))
                .layer(cors_layer(&options.cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
