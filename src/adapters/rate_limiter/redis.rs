//! Redis-backed rate limiter implementation for production deployments.
//!
//! The whole token-bucket step runs inside one Lua script, using the Redis
//! server clock, so every process sharing the Redis instance sees one
//! consistent bucket per key and concurrent callers cannot over-admit.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::time::Duration;

use crate::ports::{
    BucketPolicy, RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus,
    RateLimiter,
};

use super::bucket::retry_after_secs;

/// KEYS[1] bucket key; ARGV rate (tokens/s), burst, ttl (s).
/// Returns {allowed, remaining, retry_after_ms}.
static TOKEN_BUCKET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])

local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
  tokens = burst
  ts = now
end

local elapsed = math.max(0, now - ts)
tokens = math.min(burst, tokens + elapsed * rate / 1000)
if now > ts then
  ts = now
end

local allowed = 0
local retry_ms = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
elseif rate > 0 then
  retry_ms = math.ceil((1 - tokens) * 1000 / rate)
else
  retry_ms = ttl * 1000
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', ts)
redis.call('EXPIRE', KEYS[1], ttl)
return {allowed, math.floor(tokens), retry_ms}
"#,
    )
});

/// Redis-backed rate limiter for multi-server deployments.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisRateLimiter {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            command_timeout: Duration::from_millis(250),
        }
    }

    /// A slower reply is reported as `Unavailable` and handled by the
    /// route's fail mode.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, RateLimitError> {
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(result) => result.map_err(|e| RateLimitError::Unavailable(e.to_string())),
            Err(_) => Err(RateLimitError::Unavailable("command timed out".to_string())),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        policy: BucketPolicy,
    ) -> Result<RateLimitResult, RateLimitError> {
        if policy.burst == 0 || policy.rate < 0.0 {
            return Err(RateLimitError::InvalidPolicy(format!("{:?}", policy)));
        }
        let mut conn = self.conn.clone();
        let mut invocation = TOKEN_BUCKET.key(key.to_redis_key());
        invocation
            .arg(policy.rate)
            .arg(policy.burst)
            .arg(policy.full_refill_secs() + 1);
        let (allowed, remaining, retry_ms): (i64, i64, i64) =
            self.bounded(invocation.invoke_async(&mut conn)).await?;

        if allowed == 1 {
            return Ok(RateLimitResult::Allowed(RateLimitStatus {
                limit: policy.burst,
                remaining: remaining.max(0) as u32,
            }));
        }
        Ok(RateLimitResult::Denied(RateLimitDenied {
            limit: policy.burst,
            retry_after_secs: retry_after_secs(retry_ms.max(0) as u64),
            scope: key.scope,
        }))
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        self.bounded(
            redis::cmd("DEL")
                .arg(key.to_redis_key())
                .query_async::<_, ()>(&mut conn),
        )
        .await
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter").finish_non_exhaustive()
    }
}
