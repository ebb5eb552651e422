//! Webhook provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Verification settings for each provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    /// Stripe endpoint signing secret (`whsec_...`)
    pub stripe_webhook_secret: SecretString,

    /// Key set used to verify Apple-style signed notifications
    #[serde(default = "default_apple_jwks_url")]
    pub apple_jwks_url: String,

    /// Key set used to verify Google-style push bearer tokens
    #[serde(default = "default_google_jwks_url")]
    pub google_jwks_url: String,

    /// Audience the push subscription puts in its bearer token
    #[serde(default)]
    pub google_audience: String,

    /// Key set cache lifetime in seconds
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

    /// Events processed per sweep run
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,
}

impl WebhooksConfig {
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    /// Validate webhook configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret = self.stripe_webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("WEBHOOKS__STRIPE_WEBHOOK_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.google_audience.trim().is_empty() {
            return Err(ValidationError::MissingRequired("WEBHOOKS__GOOGLE_AUDIENCE"));
        }
        if *environment == Environment::Production {
            if !self.apple_jwks_url.starts_with("https://") {
                return Err(ValidationError::KeySetMustBeHttps("apple_jwks_url"));
            }
            if !self.google_jwks_url.starts_with("https://") {
                return Err(ValidationError::KeySetMustBeHttps("google_jwks_url"));
            }
        }
        Ok(())
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            stripe_webhook_secret: SecretString::new(String::new()),
            apple_jwks_url: default_apple_jwks_url(),
            google_jwks_url: default_google_jwks_url(),
            google_audience: String::new(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_apple_jwks_url() -> String {
    "https://appleid.apple.com/auth/keys".to_string()
}

fn default_google_jwks_url() -> String {
    "https://www.googleapis.com/oauth2/v3/certs".to_string()
}

fn default_jwks_cache_ttl() -> u64 {
    3600
}

fn default_sweep_batch_size() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> WebhooksConfig {
        WebhooksConfig {
            stripe_webhook_secret: SecretString::new("whsec_abc".to_string()),
            google_audience: "https://api.example.com/webhook/google".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = WebhooksConfig::default();
        assert_eq!(config.jwks_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.sweep_batch_size, 100);
    }

    #[test]
    fn test_validation_requires_stripe_prefix() {
        let config = WebhooksConfig {
            stripe_webhook_secret: SecretString::new("secret".to_string()),
            ..valid()
        };
        assert_eq!(
            config.validate(&Environment::Development),
            Err(ValidationError::InvalidStripeWebhookSecret)
        );
    }

    #[test]
    fn test_validation_production_requires_https_key_sets() {
        let config = WebhooksConfig {
            apple_jwks_url: "http://localhost:9000/keys".to_string(),
            ..valid()
        };
        assert!(config.validate(&Environment::Development).is_ok());
        assert_eq!(
            config.validate(&Environment::Production),
            Err(ValidationError::KeySetMustBeHttps("apple_jwks_url"))
        );
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid().validate(&Environment::Production).is_ok());
    }
}
