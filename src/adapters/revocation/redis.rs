//! Redis-backed revocation store.
//!
//! One key per revoked jti, `SET ... EX <remaining ttl>`, so the blocklist
//! never outgrows the set of tokens that could still be presented.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::ports::{RevocationError, RevocationStore};

use super::revocation_key;

/// Replies slower than this count as the store being unavailable.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisRevocationStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, RevocationError> {
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(result) => result.map_err(|e| RevocationError::Unavailable(e.to_string())),
            Err(_) => Err(RevocationError::Unavailable(format!(
                "no reply within {}ms",
                self.command_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError> {
        // Sub-second remainders round up so the entry outlives the token.
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        if secs == 0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        self.bounded(
            redis::cmd("SET")
                .arg(revocation_key(jti))
                .arg(1)
                .arg("EX")
                .arg(secs)
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.exists::<_, bool>(revocation_key(jti)))
            .await
    }
}

impl std::fmt::Debug for RedisRevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRevocationStore").finish_non_exhaustive()
    }
}
