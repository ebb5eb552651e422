//! RefreshSessionHandler - refresh-token rotation.
//!
//! Order of operations:
//! 1. Decode the presented refresh token (signature, issuer, audience, expiry, kind).
//! 2. Check its `jti` against the revocation store. Unknown status rejects.
//! 3. Sign the replacement pair in memory.
//! 4. Revoke the old `jti` for the rest of its lifetime.
//! 5. Release the new pair only after step 4 succeeded.
//!
//! Two concurrent refreshes of the same token can both pass step 2 and both
//! receive a pair. Both old-token revocations land, so neither caller can
//! replay the original token afterwards.

use std::sync::Arc;

use crate::domain::auth::{jti_prefix, TokenKind, TokenPair};
use crate::domain::foundation::{AuthError, Timestamp, UserId};
use crate::ports::{RevocationStore, TokenService};

use super::issue_session::sign_pair;

#[derive(Debug, Clone)]
pub struct RefreshSessionCommand {
    pub refresh_token: String,
}

pub struct RefreshSessionHandler {
    tokens: Arc<dyn TokenService>,
    revocations: Arc<dyn RevocationStore>,
}

impl RefreshSessionHandler {
    pub fn new(tokens: Arc<dyn TokenService>, revocations: Arc<dyn RevocationStore>) -> Self {
        Self {
            tokens,
            revocations,
        }
    }

    pub async fn handle(
        &self,
        cmd: RefreshSessionCommand,
        now: Timestamp,
    ) -> Result<TokenPair, AuthError> {
        // 1. Decode
        let claims = self.tokens.decode(&cmd.refresh_token, TokenKind::Refresh)?;
        let user_id = UserId::new(claims.sub.clone()).map_err(|_| AuthError::InvalidToken)?;
        let old_jti = jti_prefix(&claims.jti);

        // 2. Revocation check, failing closed
        match self.revocations.is_revoked(&claims.jti).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(jti = %old_jti, user_id = %user_id, "Refresh with revoked token");
                return Err(AuthError::TokenRevoked);
            }
            Err(e) => {
                tracing::warn!(jti = %old_jti, error = %e, "Revocation status unknown, refusing refresh");
                return Err(AuthError::service_unavailable("revocation store unavailable"));
            }
        }

        // 3. Sign
        let pair = sign_pair(self.tokens.as_ref(), &user_id, claims.role, now)?;

        // 4. Revoke the old token
        if let Err(e) = self
            .revocations
            .revoke(&claims.jti, claims.remaining_ttl(now))
            .await
        {
            tracing::error!(
                jti = %old_jti,
                error = %e,
                "Could not revoke rotated refresh token, discarding new pair"
            );
            return Err(AuthError::service_unavailable("revocation store unavailable"));
        }

        // 5. Release
        tracing::info!(
            user_id = %user_id,
            old_jti = %old_jti,
            new_jti = %jti_prefix(&pair.refresh.jti),
            "Refresh token rotated"
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::{JwtKeys, JwtTokenService};
    use crate::adapters::revocation::InMemoryRevocationStore;
    use crate::domain::foundation::Role;
    use crate::ports::RevocationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn tokens() -> Arc<JwtTokenService> {
        Arc::new(JwtTokenService::new(
            JwtKeys::from_secret(b"0123456789abcdefghijklmnopqrstuvwxyz").unwrap(),
            "subscription-core",
            "subscription-core-api",
            Duration::from_secs(900),
            Duration::from_secs(30 * 24 * 3600),
        ))
    }

    fn refresh_token(svc: &JwtTokenService) -> (String, String) {
        let issued = svc
            .issue(
                &UserId::new("user-1").unwrap(),
                Role::User,
                TokenKind::Refresh,
                Timestamp::now(),
            )
            .unwrap();
        (issued.token, issued.jti)
    }

    fn cmd(token: &str) -> RefreshSessionCommand {
        RefreshSessionCommand {
            refresh_token: token.to_string(),
        }
    }

    /// Answers lookups but refuses writes.
    struct ReadOnlyStore {
        revoke_called: AtomicBool,
    }

    #[async_trait]
    impl RevocationStore for ReadOnlyStore {
        async fn revoke(&self, _jti: &str, _ttl: Duration) -> Result<(), RevocationError> {
            self.revoke_called.store(true, Ordering::SeqCst);
            Err(RevocationError::Unavailable("read only replica".into()))
        }

        async fn is_revoked(&self, _jti: &str) -> Result<bool, RevocationError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn rotation_revokes_the_old_token() {
        let svc = tokens();
        let store = Arc::new(InMemoryRevocationStore::new());
        let handler = RefreshSessionHandler::new(svc.clone(), store.clone());
        let (token, jti) = refresh_token(&svc);

        let pair = handler.handle(cmd(&token), Timestamp::now()).await.unwrap();

        assert!(store.is_revoked(&jti).await.unwrap());
        assert!(!store.is_revoked(&pair.refresh.jti).await.unwrap());
        let claims = svc.decode(&pair.access.token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[tokio::test]
    async fn replayed_refresh_token_is_revoked() {
        let svc = tokens();
        let handler =
            RefreshSessionHandler::new(svc.clone(), Arc::new(InMemoryRevocationStore::new()));
        let (token, _) = refresh_token(&svc);

        handler.handle(cmd(&token), Timestamp::now()).await.unwrap();
        let err = handler.handle(cmd(&token), Timestamp::now()).await.unwrap_err();
        assert_eq!(err, AuthError::TokenRevoked);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let svc = tokens();
        let handler =
            RefreshSessionHandler::new(svc.clone(), Arc::new(InMemoryRevocationStore::new()));
        let access = svc
            .issue(
                &UserId::new("user-1").unwrap(),
                Role::User,
                TokenKind::Access,
                Timestamp::now(),
            )
            .unwrap();

        let err = handler
            .handle(cmd(&access.token), Timestamp::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::WrongTokenKind);
    }

    #[tokio::test]
    async fn unreachable_store_fails_closed() {
        let svc = tokens();
        let store = Arc::new(InMemoryRevocationStore::new());
        store.set_unavailable(true);
        let handler = RefreshSessionHandler::new(svc.clone(), store);
        let (token, _) = refresh_token(&svc);

        let err = handler.handle(cmd(&token), Timestamp::now()).await.unwrap_err();
        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn failed_revocation_withholds_the_new_pair() {
        let svc = tokens();
        let store = Arc::new(ReadOnlyStore {
            revoke_called: AtomicBool::new(false),
        });
        let handler = RefreshSessionHandler::new(svc.clone(), store.clone());
        let (token, _) = refresh_token(&svc);

        let err = handler.handle(cmd(&token), Timestamp::now()).await.unwrap_err();

        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
        assert!(store.revoke_called.load(Ordering::SeqCst));
    }
}
