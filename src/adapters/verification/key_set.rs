//! Signing-key sets for webhook envelopes.
//!
//! `JwksKeySetProvider` fetches a JWKS document over HTTPS and caches it.
//! A lookup for an unknown `kid` refetches once, at most every
//! `MIN_REFRESH_INTERVAL`, so rotated keys are picked up without letting
//! arbitrary key ids drive traffic to the provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;

use crate::ports::{KeySetError, KeySetProvider};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cached JWKS with expiry tracking.
struct JwksCache {
    jwks: JwkSet,
    fetched_at: Instant,
}

impl JwksCache {
    fn new(jwks: JwkSet) -> Self {
        Self {
            jwks,
            fetched_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }

    fn may_refresh(&self) -> bool {
        self.fetched_at.elapsed() >= MIN_REFRESH_INTERVAL
    }
}

pub struct JwksKeySetProvider {
    url: String,
    http_client: reqwest::Client,
    cache_duration: Duration,
    cache: Arc<RwLock<Option<JwksCache>>>,
}

impl JwksKeySetProvider {
    /// Keys are fetched lazily on first lookup.
    pub fn new(url: impl Into<String>, http_client: reqwest::Client, cache_duration: Duration) -> Self {
        Self {
            url: url.into(),
            http_client,
            cache_duration,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Starts with `jwks` already cached.
    pub fn with_keys(mut self, jwks: JwkSet) -> Self {
        self.cache = Arc::new(RwLock::new(Some(JwksCache::new(jwks))));
        self
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, KeySetError> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        let response = self.http_client.get(&self.url).send().await.map_err(|e| {
            tracing::error!("Failed to fetch JWKS: {}", e);
            KeySetError::Unavailable(format!("fetch failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(url = %self.url, "JWKS endpoint returned {}", status);
            return Err(KeySetError::Unavailable(format!("endpoint returned {}", status)));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse JWKS: {}", e);
            KeySetError::Unavailable(format!("invalid JWKS: {}", e))
        })?;

        tracing::debug!("Fetched {} keys from JWKS", jwks.keys.len());
        Ok(jwks)
    }

    async fn refresh(&self) -> Result<JwkSet, KeySetError> {
        let jwks = self.fetch_jwks().await?;
        *self.cache.write().await = Some(JwksCache::new(jwks.clone()));
        Ok(jwks)
    }
}

#[async_trait]
impl KeySetProvider for JwksKeySetProvider {
    async fn find(&self, kid: &str) -> Result<Jwk, KeySetError> {
        let may_refresh = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) if !cached.is_expired(self.cache_duration) => {
                    if let Some(jwk) = cached.jwks.find(kid) {
                        return Ok(jwk.clone());
                    }
                    cached.may_refresh()
                }
                _ => true,
            }
        };

        if !may_refresh {
            tracing::warn!(kid, "Unknown signing key, refresh throttled");
            return Err(KeySetError::UnknownKey(kid.to_string()));
        }

        let jwks = self.refresh().await?;
        jwks.find(kid).cloned().ok_or_else(|| {
            tracing::warn!(kid, "No matching key found after refresh");
            KeySetError::UnknownKey(kid.to_string())
        })
    }
}

impl std::fmt::Debug for JwksKeySetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksKeySetProvider")
            .field("url", &self.url)
            .field("cache_duration", &self.cache_duration)
            .finish_non_exhaustive()
    }
}

/// Fixed key set, for development and tests.
#[derive(Debug, Clone)]
pub struct StaticKeySet {
    jwks: JwkSet,
}

impl StaticKeySet {
    pub fn new(jwks: JwkSet) -> Self {
        Self { jwks }
    }
}

#[async_trait]
impl KeySetProvider for StaticKeySet {
    async fn find(&self, kid: &str) -> Result<Jwk, KeySetError> {
        self.jwks
            .find(kid)
            .cloned()
            .ok_or_else(|| KeySetError::UnknownKey(kid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::verification::fixtures;

    fn unreachable_provider() -> JwksKeySetProvider {
        // Port 9 (discard) on localhost: connection refused.
        JwksKeySetProvider::new(
            "http://127.0.0.1:9/jwks.json",
            reqwest::Client::new(),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn cached_key_is_served_without_fetching() {
        let provider = unreachable_provider().with_keys(fixtures::jwks());
        let jwk = provider.find(fixtures::KID).await.unwrap();
        assert_eq!(jwk.common.key_id.as_deref(), Some(fixtures::KID));
    }

    #[tokio::test]
    async fn unknown_kid_with_fresh_cache_is_not_refetched() {
        let provider = unreachable_provider().with_keys(fixtures::jwks());
        assert_eq!(
            provider.find("rotated-key").await,
            Err(KeySetError::UnknownKey("rotated-key".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_cache_with_unreachable_endpoint_is_unavailable() {
        let provider = unreachable_provider();
        assert!(matches!(
            provider.find(fixtures::KID).await,
            Err(KeySetError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn static_key_set_lookup() {
        let keys = StaticKeySet::new(fixtures::jwks());
        assert!(keys.find(fixtures::KID).await.is_ok());
        assert!(matches!(keys.find("other").await, Err(KeySetError::UnknownKey(_))));
    }
}
