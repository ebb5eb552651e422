//! Rate limit policies per route class

use serde::Deserialize;

use crate::ports::BucketPolicy;

use super::error::ValidationError;

/// What a bucket is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    Ip,
    /// Authenticated user; anonymous callers fall back to their IP.
    User,
    /// One bucket shared by every caller of the route.
    Endpoint,
    IpEndpoint,
    UserEndpoint,
}

/// Behaviour when the limiter backend cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Let the request through.
    Open,
    /// Reject with 503.
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutePolicy {
    /// Tokens per second
    pub rate: f64,
    /// Bucket capacity
    pub burst: u32,
    pub key: KeyStrategy,
    pub fail_mode: FailMode,
}

impl RoutePolicy {
    pub fn new(rate: f64, burst: u32, key: KeyStrategy, fail_mode: FailMode) -> Self {
        Self {
            rate,
            burst,
            key,
            fail_mode,
        }
    }

    pub fn bucket(&self) -> BucketPolicy {
        BucketPolicy::new(self.rate, self.burst)
    }

    fn validate(&self, name: &'static str) -> Result<(), ValidationError> {
        if !(self.rate.is_finite() && self.rate > 0.0) || self.burst == 0 {
            return Err(ValidationError::InvalidRateLimit(name));
        }
        Ok(())
    }
}

/// Route classes with their own limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    AuthRefresh,
    Polling,
    WebhookIngress,
    Default,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::AuthRefresh => "auth_refresh",
            RouteClass::Polling => "polling",
            RouteClass::WebhookIngress => "webhook_ingress",
            RouteClass::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsConfig {
    /// Turn the middleware off entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_auth_refresh")]
    pub auth_refresh: RoutePolicy,

    #[serde(default = "default_polling")]
    pub polling: RoutePolicy,

    #[serde(default = "default_webhook_ingress")]
    pub webhook_ingress: RoutePolicy,

    #[serde(default = "default_policy")]
    pub default: RoutePolicy,
}

impl RateLimitsConfig {
    pub fn policy(&self, class: RouteClass) -> &RoutePolicy {
        match class {
            RouteClass::AuthRefresh => &self.auth_refresh,
            RouteClass::Polling => &self.polling,
            RouteClass::WebhookIngress => &self.webhook_ingress,
            RouteClass::Default => &self.default,
        }
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.auth_refresh.validate("auth_refresh")?;
        self.polling.validate("polling")?;
        self.webhook_ingress.validate("webhook_ingress")?;
        self.default.validate("default")?;
        Ok(())
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auth_refresh: default_auth_refresh(),
            polling: default_polling(),
            webhook_ingress: default_webhook_ingress(),
            default: default_policy(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// 10 per minute per address.
fn default_auth_refresh() -> RoutePolicy {
    RoutePolicy::new(10.0 / 60.0, 5, KeyStrategy::IpEndpoint, FailMode::Closed)
}

fn default_polling() -> RoutePolicy {
    RoutePolicy::new(1.0, 10, KeyStrategy::UserEndpoint, FailMode::Open)
}

fn default_webhook_ingress() -> RoutePolicy {
    RoutePolicy::new(50.0, 200, KeyStrategy::Endpoint, FailMode::Open)
}

fn default_policy() -> RoutePolicy {
    RoutePolicy::new(5.0, 20, KeyStrategy::User, FailMode::Open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RateLimitsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy(RouteClass::AuthRefresh).fail_mode, FailMode::Closed);
        assert_eq!(config.policy(RouteClass::Polling).fail_mode, FailMode::Open);
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = RateLimitsConfig {
            polling: RoutePolicy::new(1.0, 0, KeyStrategy::User, FailMode::Open),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRateLimit("polling")));
    }

    #[test]
    fn test_policy_deserializes() {
        let policy: RoutePolicy = serde_json::from_str(
            r#"{"rate": 0.5, "burst": 3, "key": "user_endpoint", "fail_mode": "closed"}"#,
        )
        .unwrap();
        assert_eq!(policy.key, KeyStrategy::UserEndpoint);
        assert_eq!(policy.bucket(), BucketPolicy::new(0.5, 3));
    }
}
