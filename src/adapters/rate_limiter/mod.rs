//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port for different backends.
//!
//! ## Available Adapters
//!
//! - `InMemoryRateLimiter` - In-memory for testing and single-server
//! - `RedisRateLimiter` - Redis-backed for production multi-server
//!
//! ## Usage
//!
//! ```ignore
//! use subscription_core::adapters::rate_limiter::InMemoryRateLimiter;
//! use subscription_core::ports::{BucketPolicy, RateLimitKey, RateLimiter};
//!
//! let limiter = InMemoryRateLimiter::new();
//! let result = limiter.check(&RateLimitKey::ip("10.0.0.1"), BucketPolicy::new(1.0, 3)).await?;
//! ```

mod bucket;
mod in_memory;
mod redis;

pub use bucket::{retry_after_secs, Admission, BucketState};
pub use in_memory::{InMemoryRateLimiter, MillisClock};
pub use redis::RedisRateLimiter;
