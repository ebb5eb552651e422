//! Rate limiting port for admission control.
//!
//! Token bucket: a bucket holds at most `burst` tokens and refills at `rate`
//! tokens per second; each admitted request takes one. The check and the
//! decrement must be a single atomic step against the shared store, so
//! concurrent callers on the same key can never be over-admitted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::UserId;

/// Port for rate limiting operations.
///
/// Implementations should be thread-safe and support concurrent access.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if a request is allowed under `policy`, consuming a token if so.
    ///
    /// Returns `Allowed` with the remaining tokens or `Denied` with the wait
    /// until the next token.
    async fn check(
        &self,
        key: &RateLimitKey,
        policy: BucketPolicy,
    ) -> Result<RateLimitResult, RateLimitError>;

    /// Reset a bucket to full (admin operation).
    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError>;
}

/// Refill rate and capacity of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketPolicy {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl BucketPolicy {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self { rate, burst }
    }

    /// Seconds the bucket takes to refill completely; used as the key ttl.
    pub fn full_refill_secs(&self) -> u64 {
        if self.rate <= 0.0 {
            return 86_400;
        }
        (f64::from(self.burst) / self.rate).ceil().max(1.0) as u64
    }
}

/// Key identifying what to rate limit.
///
/// Rate limits can be scoped globally, per-IP, per-user, or per-endpoint,
/// and the IP and user scopes can be narrowed to one endpoint.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    /// The scope of this rate limit.
    pub scope: RateLimitScope,
    /// Identifier within the scope (e.g., IP address, user ID).
    pub identifier: String,
    /// Optional endpoint for finer-grained limits (e.g., "auth_refresh").
    pub resource: Option<String>,
}

/// The scope at which rate limiting is applied.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    Global,
    Ip,
    User,
    Endpoint,
}

impl RateLimitKey {
    pub fn global() -> Self {
        Self {
            scope: RateLimitScope::Global,
            identifier: "global".to_string(),
            resource: None,
        }
    }

    pub fn ip(ip: &str) -> Self {
        Self {
            scope: RateLimitScope::Ip,
            identifier: ip.to_string(),
            resource: None,
        }
    }

    pub fn user(user_id: &UserId) -> Self {
        Self {
            scope: RateLimitScope::User,
            identifier: user_id.to_string(),
            resource: None,
        }
    }

    pub fn endpoint(endpoint: &str) -> Self {
        Self {
            scope: RateLimitScope::Endpoint,
            identifier: endpoint.to_string(),
            resource: None,
        }
    }

    /// Narrows the key to one endpoint.
    pub fn on(mut self, endpoint: &str) -> Self {
        self.resource = Some(endpoint.to_string());
        self
    }

    /// Returns the Redis key string for this rate limit key.
    pub fn to_redis_key(&self) -> String {
        match &self.resource {
            Some(resource) => format!(
                "ratelimit:{}:{}:{}",
                self.scope.as_str(),
                self.identifier,
                resource
            ),
            None => format!("ratelimit:{}:{}", self.scope.as_str(), self.identifier),
        }
    }
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Ip => "ip",
            RateLimitScope::User => "user",
            RateLimitScope::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Request is allowed; includes current status.
    Allowed(RateLimitStatus),
    /// Request is denied; includes denial details.
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitResult::Denied(_))
    }
}

/// Bucket state after an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Bucket capacity.
    pub limit: u32,
    /// Whole tokens left after this request.
    pub remaining: u32,
}

/// Details of a rate limit denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDenied {
    pub limit: u32,
    /// Seconds until the next token, at least 1.
    pub retry_after_secs: u32,
    /// The scope that triggered the denial.
    pub scope: RateLimitScope,
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}
