//! Session validation port.
//!
//! # Security Requirements
//!
//! All implementations MUST check, in order:
//! - **Signature** and **issuer/audience**
//! - **Expiry (exp)**
//! - **Token kind**: refresh tokens are never accepted as access tokens
//! - **Revocation**: the token's `jti` must not be on the blocklist. If the
//!   blocklist cannot be consulted the token is rejected.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedSession};

/// Validates access tokens and extracts the session.
///
/// # Contract
///
/// - `AuthError::InvalidToken` for malformed tokens or bad signatures
/// - `AuthError::TokenExpired` for expired tokens
/// - `AuthError::TokenRevoked` for revoked tokens
/// - `AuthError::ServiceUnavailable` when revocation status is unknown
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a raw access token (without the "Bearer " prefix).
    async fn validate(&self, token: &str) -> Result<AuthenticatedSession, AuthError>;
}
