//! LogoutHandler - revokes the caller's access token and, when presented,
//! the refresh token of the same session.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::auth::{jti_prefix, TokenKind};
use crate::domain::foundation::{AuthError, RequestContext, Timestamp};
use crate::ports::{RevocationStore, TokenService};

#[derive(Debug, Clone, Default)]
pub struct LogoutCommand {
    pub refresh_token: Option<String>,
}

pub struct LogoutHandler {
    tokens: Arc<dyn TokenService>,
    revocations: Arc<dyn RevocationStore>,
}

impl LogoutHandler {
    pub fn new(tokens: Arc<dyn TokenService>, revocations: Arc<dyn RevocationStore>) -> Self {
        Self {
            tokens,
            revocations,
        }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: LogoutCommand,
        now: Timestamp,
    ) -> Result<(), AuthError> {
        let access_ttl = Duration::from_secs(
            ctx.token_expires_at
                .as_unix_secs()
                .saturating_sub(now.as_unix_secs()),
        );
        self.revoke(&ctx.jti, access_ttl).await?;

        if let Some(token) = cmd.refresh_token.as_deref() {
            match self.tokens.decode(token, TokenKind::Refresh) {
                Ok(claims) => {
                    // A session's refresh token is only ever revoked by its owner.
                    if claims.sub != ctx.user_id.as_str() {
                        return Err(AuthError::InsufficientPermissions);
                    }
                    self.revoke(&claims.jti, claims.remaining_ttl(now)).await?;
                }
                // Already dead, nothing to block.
                Err(AuthError::TokenExpired) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::info!(user_id = %ctx.user_id, request_id = %ctx.request_id, "Logged out");
        Ok(())
    }

    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), AuthError> {
        self.revocations.revoke(jti, ttl).await.map_err(|e| {
            tracing::warn!(jti = %jti_prefix(jti), error = %e, "Revocation failed during logout");
            AuthError::service_unavailable("revocation store unavailable")
        })
    }
}
