//! HTTP adapter for session token endpoints.
//!
//! - `POST /auth/refresh` - Rotate a refresh token into a new pair
//! - `POST /auth/logout` - Revoke the current access token (and optionally a refresh token)

mod dto;
mod handlers;
mod routes;

pub use dto::{LogoutRequest, RefreshRequest, TokenPairResponse};
pub use handlers::AuthHandlers;
pub use routes::{logout_routes, refresh_routes};
