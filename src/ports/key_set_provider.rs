//! KeySetProvider port - signing keys addressed by key id.

use async_trait::async_trait;
use jsonwebtoken::jwk::Jwk;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySetError {
    /// No key with this id, even after a refresh.
    #[error("unknown key id: {0}")]
    UnknownKey(String),

    #[error("key set unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeySetProvider: Send + Sync {
    /// Looks up the key named `kid`, refreshing the set once on a miss.
    async fn find(&self, kid: &str) -> Result<Jwk, KeySetError>;
}
