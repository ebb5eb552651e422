//! Revocation store adapters.
//!
//! - `InMemoryRevocationStore` - process-local, for tests and development
//! - `RedisRevocationStore` - shared blocklist with per-entry TTL

mod in_memory;
mod redis;

pub use in_memory::InMemoryRevocationStore;
pub use redis::RedisRevocationStore;

/// Cache key for a revoked token id.
pub(crate) fn revocation_key(jti: &str) -> String {
    format!("revoked:{}", jti)
}
