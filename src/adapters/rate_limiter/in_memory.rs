//! In-memory rate limiter implementation for testing and development.
//!
//! Buckets live in a process-local map behind a mutex, so checks are atomic
//! within one process. Not suitable for multi-server deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::ports::{
    BucketPolicy, RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus,
    RateLimiter,
};

use super::bucket::{retry_after_secs, Admission, BucketState};

/// Source of milliseconds since the epoch.
pub type MillisClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// In-memory token-bucket limiter.
pub struct InMemoryRateLimiter {
    buckets: Mutex<HashMap<String, BucketState>>,
    clock: MillisClock,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(system_millis))
    }

    /// Uses `clock` instead of the system time; tests drive time explicitly.
    pub fn with_clock(clock: MillisClock) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of buckets currently tracked.
    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRateLimiter").finish_non_exhaustive()
    }
}

fn system_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        policy: BucketPolicy,
    ) -> Result<RateLimitResult, RateLimitError> {
        if policy.burst == 0 || policy.rate < 0.0 {
            return Err(RateLimitError::InvalidPolicy(format!("{:?}", policy)));
        }
        let now = (self.clock)();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_redis_key())
            .or_insert_with(|| BucketState::full(policy, now));

        Ok(match bucket.take(policy, now) {
            Admission::Allowed { remaining } => RateLimitResult::Allowed(RateLimitStatus {
                limit: policy.burst,
                remaining,
            }),
            Admission::Denied { retry_after_ms } => RateLimitResult::Denied(RateLimitDenied {
                limit: policy.burst,
                retry_after_secs: retry_after_secs(retry_after_ms),
                scope: key.scope,
            }),
        })
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        self.buckets.lock().await.remove(&key.to_redis_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn fixed_clock() -> (Arc<AtomicI64>, MillisClock) {
        let now = Arc::new(AtomicI64::new(1_000_000));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn four_requests_in_one_second_fourth_denied() {
        let (_, clock) = fixed_clock();
        let limiter = InMemoryRateLimiter::with_clock(clock);
        let key = RateLimitKey::ip("203.0.113.9");
        let policy = BucketPolicy::new(1.0, 3);

        for _ in 0..3 {
            assert!(limiter.check(&key, policy).await.unwrap().is_allowed());
        }
        match limiter.check(&key, policy).await.unwrap() {
            RateLimitResult::Denied(denied) => assert!(denied.retry_after_secs >= 1),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (_, clock) = fixed_clock();
        let limiter = InMemoryRateLimiter::with_clock(clock);
        let policy = BucketPolicy::new(1.0, 1);
        assert!(limiter.check(&RateLimitKey::ip("a"), policy).await.unwrap().is_allowed());
        assert!(limiter.check(&RateLimitKey::ip("b"), policy).await.unwrap().is_allowed());
        assert!(limiter.check(&RateLimitKey::ip("a"), policy).await.unwrap().is_denied());
    }

    #[tokio::test]
    async fn refill_after_wait() {
        let (now, clock) = fixed_clock();
        let limiter = InMemoryRateLimiter::with_clock(clock);
        let key = RateLimitKey::global();
        let policy = BucketPolicy::new(1.0, 1);
        assert!(limiter.check(&key, policy).await.unwrap().is_allowed());
        assert!(limiter.check(&key, policy).await.unwrap().is_denied());
        now.fetch_add(1_000, Ordering::SeqCst);
        assert!(limiter.check(&key, policy).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn reset_restores_full_bucket() {
        let limiter = InMemoryRateLimiter::new();
        let key = RateLimitKey::endpoint("polling");
        let policy = BucketPolicy::new(0.001, 1);
        limiter.check(&key, policy).await.unwrap();
        assert!(limiter.check(&key, policy).await.unwrap().is_denied());
        limiter.reset(&key).await.unwrap();
        assert!(limiter.check(&key, policy).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn concurrent_callers_never_over_admit() {
        let (_, clock) = fixed_clock();
        let limiter = Arc::new(InMemoryRateLimiter::with_clock(clock));
        let key = RateLimitKey::ip("198.51.100.1");
        let policy = BucketPolicy::new(1.0, 5);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                let key = key.clone();
                tokio::spawn(async move { limiter.check(&key, policy).await.unwrap().is_allowed() })
            })
            .collect();
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn zero_burst_is_rejected() {
        let limiter = InMemoryRateLimiter::new();
        let result = limiter
            .check(&RateLimitKey::global(), BucketPolicy::new(1.0, 0))
            .await;
        assert!(matches!(result, Err(RateLimitError::InvalidPolicy(_))));
    }
}
