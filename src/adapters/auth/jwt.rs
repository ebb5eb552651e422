//! First-party HS256 session tokens.
//!
//! Implements the `TokenService` port. Every token carries a random `jti`
//! (the revocation key), the token kind, the caller's role and the
//! configured issuer and audience. Decoding checks signature, issuer,
//! audience and expiry with zero leeway, then the kind.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::config::{AuthConfig, MIN_JWT_SECRET_BYTES};
use crate::domain::auth::{Claims, IssuedToken, TokenKind};
use crate::domain::foundation::{AuthError, Role, Timestamp, UserId};
use crate::ports::TokenService;

/// Signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    /// Builds keys after checking the secret is long and varied enough.
    pub fn from_secret(secret: &[u8]) -> Result<Self, AuthError> {
        validate_secret(secret)?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

fn validate_secret(secret: &[u8]) -> Result<(), AuthError> {
    if secret.len() < MIN_JWT_SECRET_BYTES {
        return Err(AuthError::service_unavailable(format!(
            "signing secret must be at least {} bytes",
            MIN_JWT_SECRET_BYTES
        )));
    }
    let distinct: HashSet<u8> = secret.iter().copied().collect();
    if distinct.len() < 8 {
        return Err(AuthError::service_unavailable(
            "signing secret has too little variety",
        ));
    }
    Ok(())
}

/// Issues and decodes HS256 access and refresh tokens.
#[derive(Debug, Clone)]
pub struct JwtTokenService {
    keys: JwtKeys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtTokenService {
    pub fn new(
        keys: JwtKeys,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let keys = JwtKeys::from_secret(config.jwt_secret.expose_secret().as_bytes())?;
        Ok(Self::new(
            keys,
            config.issuer.clone(),
            config.audience.clone(),
            config.access_ttl(),
            config.refresh_ttl(),
        ))
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation
    }
}

impl TokenService for JwtTokenService {
    fn issue(
        &self,
        user_id: &UserId,
        role: Role,
        kind: TokenKind,
        now: Timestamp,
    ) -> Result<IssuedToken, AuthError> {
        let iat = now.as_unix_secs();
        let exp = iat + self.ttl(kind).as_secs();
        let claims = Claims {
            sub: user_id.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            token_use: kind,
            role,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| {
                tracing::error!("Failed to sign token: {}", e);
                AuthError::service_unavailable("token signing failed")
            })?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            kind,
            expires_at: Timestamp::from_unix_secs(exp),
        })
    }

    fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.keys.decoding, &self.validation()).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Token expired");
                    AuthError::TokenExpired
                }
                ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                    tracing::warn!("Token issuer or audience mismatch");
                    AuthError::InvalidToken
                }
                _ => {
                    tracing::debug!("Token validation failed: {}", e);
                    AuthError::InvalidToken
                }
            },
        )?;

        if data.claims.token_use != kind {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(data.claims)
    }
}
