//! Authentication types for the domain layer.
//!
//! `RequestContext` is the typed, request-scoped identity every handler
//! receives once the bearer token has passed signature, expiry and
//! revocation checks. It carries no provider types, so any token service
//! can populate it through the `SessionValidator` port.
//!
//! # Example
//!
//! ```ignore
//! let ctx = session_validator.validate(token).await?
//!     .into_context(request_id);
//! request.extensions_mut().insert(ctx);
//! ```

use super::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Caller role carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    /// Internal callers (other services, operators' scripts).
    Service,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Service => "service",
        }
    }

    /// Returns true if this role may act on other users' data.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Service)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "service" => Ok(Role::Service),
            _ => Err(AuthError::InvalidToken),
        }
    }
}

/// A validated session: the verified claims of a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub user_id: UserId,
    pub role: Role,
    /// Unique token id, the revocation-list key.
    pub jti: String,
    pub expires_at: Timestamp,
}

impl AuthenticatedSession {
    /// Attaches the request id, producing the request-scoped context.
    pub fn into_context(self, request_id: impl Into<String>) -> RequestContext {
        RequestContext {
            user_id: self.user_id,
            request_id: request_id.into(),
            role: self.role,
            jti: self.jti,
            token_expires_at: self.expires_at,
        }
    }
}

/// Typed request-scoped context handed to every authenticated handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub request_id: String,
    pub role: Role,
    pub jti: String,
    pub token_expires_at: Timestamp,
}

/// Authentication errors that can occur during token validation.
///
/// Messages are intentionally generic; callers never learn which check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    /// The token's jti is on the revocation list.
    #[error("Token revoked")]
    TokenRevoked,

    /// A refresh token was presented where an access token is required, or vice versa.
    #[error("Wrong token kind")]
    WrongTokenKind,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// A dependency needed to decide (revocation store, key set) is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the user should re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::TokenRevoked
                | AuthError::WrongTokenKind
        )
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken | AuthError::WrongTokenKind => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::InsufficientPermissions => "FORBIDDEN",
            AuthError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthenticatedSession {
        AuthenticatedSession {
            user_id: UserId::new("user-123").unwrap(),
            role: Role::User,
            jti: "jti-1".to_string(),
            expires_at: Timestamp::from_unix_secs(2_000_000_000),
        }
    }

    #[test]
    fn into_context_carries_identity_and_request_id() {
        let ctx = session().into_context("req-42");
        assert_eq!(ctx.user_id.as_str(), "user-123");
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.role, Role::User);
        assert_eq!(ctx.jti, "jti-1");
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Admin, Role::Service] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn only_admin_and_service_are_privileged() {
        assert!(!Role::User.is_privileged());
        assert!(Role::Admin.is_privileged());
        assert!(Role::Service.is_privileged());
    }

    #[test]
    fn auth_error_service_unavailable_displays_message() {
        let err = AuthError::service_unavailable("Connection refused");
        assert_eq!(format!("{}", err), "Auth service unavailable: Connection refused");
    }

    #[test]
    fn revoked_token_requires_reauthentication() {
        assert!(AuthError::TokenRevoked.requires_reauthentication());
        assert!(AuthError::InvalidToken.requires_reauthentication());
        assert!(!AuthError::InsufficientPermissions.requires_reauthentication());
        assert!(!AuthError::service_unavailable("").requires_reauthentication());
    }

    #[test]
    fn only_service_errors_are_transient() {
        assert!(AuthError::service_unavailable("timeout").is_transient());
        assert!(!AuthError::TokenRevoked.is_transient());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthError::TokenRevoked.code(), "TOKEN_REVOKED");
        assert_eq!(AuthError::WrongTokenKind.code(), "INVALID_TOKEN");
    }
}
