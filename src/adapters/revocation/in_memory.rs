//! In-memory revocation store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::ports::{RevocationError, RevocationStore};

/// Process-local blocklist. Entries disappear once their TTL passes.
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    entries: RwLock<HashMap<String, Instant>>,
    unavailable: AtomicBool,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a backend outage: every call returns `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RevocationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RevocationError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError> {
        self.check_available()?;
        if ttl.is_zero() {
            return Ok(());
        }
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, expires| *expires > now);
        entries.insert(jti.to_string(), now + ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(jti)
            .map(|expires| *expires > Instant::now())
            .unwrap_or(false))
    }
}
