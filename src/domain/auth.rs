//! Session tokens: kinds, claims and issued pairs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{AuthenticatedSession, AuthError, Role, Timestamp, UserId};

/// Default access-token lifetime.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh-token lifetime.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT claims carried by every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Unique id, the revocation key.
    pub jti: String,
    pub token_use: TokenKind,
    #[serde(default)]
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn expires_at(&self) -> Timestamp {
        Timestamp::from_unix_secs(self.exp)
    }

    /// Seconds of validity left at `now`; zero once expired.
    pub fn remaining_ttl(&self, now: Timestamp) -> Duration {
        Duration::from_secs(self.exp.saturating_sub(now.as_unix_secs()))
    }

    /// Converts verified claims into a session, checking the token kind.
    pub fn into_session(self, expected: TokenKind) -> Result<AuthenticatedSession, AuthError> {
        if self.token_use != expected {
            return Err(AuthError::WrongTokenKind);
        }
        let user_id = UserId::new(self.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedSession {
            user_id,
            role: self.role,
            expires_at: Timestamp::from_unix_secs(self.exp),
            jti: self.jti,
        })
    }
}

/// A signed token and its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub kind: TokenKind,
    pub expires_at: Timestamp,
}

/// Access and refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Prefix of a jti safe to put in logs.
pub fn jti_prefix(jti: &str) -> &str {
    let end = jti
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(jti.len());
    &jti[..end]
}
