//! Access-token validation with revocation checks.
//!
//! Signature, claims and kind come from the `TokenService`; the `jti` is
//! then looked up in the `RevocationStore`. A store that cannot answer
//! rejects the request with `ServiceUnavailable`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::auth::{jti_prefix, TokenKind};
use crate::domain::foundation::{AuthError, AuthenticatedSession};
use crate::ports::{RevocationStore, SessionValidator, TokenService};

pub struct RevocationAwareSessionValidator {
    tokens: Arc<dyn TokenService>,
    revocations: Arc<dyn RevocationStore>,
}

impl RevocationAwareSessionValidator {
    pub fn new(tokens: Arc<dyn TokenService>, revocations: Arc<dyn RevocationStore>) -> Self {
        Self {
            tokens,
            revocations,
        }
    }
}

#[async_trait]
impl SessionValidator for RevocationAwareSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedSession, AuthError> {
        let claims = self.tokens.decode(token, TokenKind::Access)?;

        match self.revocations.is_revoked(&claims.jti).await {
            Ok(false) => claims.into_session(TokenKind::Access),
            Ok(true) => {
                tracing::info!(jti = %jti_prefix(&claims.jti), "Rejected revoked access token");
                Err(AuthError::TokenRevoked)
            }
            Err(e) => {
                tracing::warn!(
                    jti = %jti_prefix(&claims.jti),
                    error = %e,
                    "Revocation status unknown, rejecting token"
                );
                Err(AuthError::service_unavailable("revocation store unavailable"))
            }
        }
    }
}

impl std::fmt::Debug for RevocationAwareSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationAwareSessionValidator")
            .finish_non_exhaustive()
    }
}
