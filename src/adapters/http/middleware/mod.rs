//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `auth` - Bearer token validation, fails closed
//! - `rate_limit` - Token-bucket admission per route class

pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, AuthRejection, AuthState, RequireAuth};
pub(crate) use auth::auth_error_response;
pub use rate_limit::{derive_key, rate_limit_middleware, RateLimitState};

/// Header carrying the request id, set on the way in and echoed on the way out.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
