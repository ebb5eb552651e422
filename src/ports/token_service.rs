//! TokenService port - signs and decodes session tokens.
//!
//! Signing is local and synchronous; revocation lives in `RevocationStore`.

use crate::domain::auth::{Claims, IssuedToken, TokenKind};
use crate::domain::foundation::{AuthError, Role, Timestamp, UserId};

pub trait TokenService: Send + Sync {
    /// Issues a token with a fresh `jti`.
    fn issue(
        &self,
        user_id: &UserId,
        role: Role,
        kind: TokenKind,
        now: Timestamp,
    ) -> Result<IssuedToken, AuthError>;

    /// Verifies signature, issuer, audience and expiry, and checks the kind.
    fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError>;
}
