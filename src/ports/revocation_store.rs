//! RevocationStore port - blocklist of invalidated token ids.
//!
//! Entries expire on their own once the token they block would have expired
//! anyway. A store that cannot answer must report `Unavailable`; callers
//! treat that as a rejection.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevocationError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Blocks `jti` for `ttl`. A zero ttl is a no-op (the token is already dead).
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;
}
