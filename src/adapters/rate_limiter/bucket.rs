//! Token-bucket arithmetic.
//!
//! The in-memory limiter runs this directly; the Redis script implements the
//! same steps server-side so the read, refill and decrement happen atomically.

use crate::ports::BucketPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after_ms: u64 },
}

impl BucketState {
    /// A bucket seen for the first time starts full.
    pub fn full(policy: BucketPolicy, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(policy.burst),
            last_refill_ms: now_ms,
        }
    }

    /// Refills for the time elapsed since the last call and tries to take a token.
    pub fn take(&mut self, policy: BucketPolicy, now_ms: i64) -> Admission {
        let burst = f64::from(policy.burst);
        let elapsed_ms = (now_ms - self.last_refill_ms).max(0) as f64;
        self.tokens = (self.tokens + elapsed_ms * policy.rate / 1000.0).min(burst);
        // Clock going backwards must not hand out refills later.
        self.last_refill_ms = self.last_refill_ms.max(now_ms);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Admission::Allowed {
                remaining: self.tokens.floor() as u32,
            };
        }
        let retry_after_ms = if policy.rate > 0.0 {
            ((1.0 - self.tokens) * 1000.0 / policy.rate).ceil() as u64
        } else {
            u64::MAX
        };
        Admission::Denied { retry_after_ms }
    }
}

/// Whole seconds to advertise in `Retry-After`, never zero.
pub fn retry_after_secs(retry_after_ms: u64) -> u32 {
    let secs = retry_after_ms.div_ceil(1000).max(1);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
