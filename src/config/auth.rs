//! Authentication configuration (first-party HS256 tokens)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use super::error::ValidationError;

/// Minimum signing key length in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: SecretString,

    /// `iss` claim written and required
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// `aud` claim written and required
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Access token lifetime in seconds
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }

    /// Validate authentication configuration
    ///
    /// The secret must be long and not trivially repetitive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        let distinct: HashSet<u8> = secret.iter().copied().collect();
        if secret.len() < MIN_JWT_SECRET_BYTES || distinct.len() < 8 {
            return Err(ValidationError::WeakJwtSecret);
        }
        if self.issuer.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__ISSUER"));
        }
        if self.audience.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__AUDIENCE"));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: SecretString::new(String::new()),
            issuer: default_issuer(),
            audience: default_audience(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
        }
    }
}

fn default_issuer() -> String {
    "subscription-core".to_string()
}

fn default_audience() -> String {
    "subscription-core-api".to_string()
}

fn default_access_ttl() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    30 * 24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: SecretString::new(secret.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_config_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.access_ttl(), Duration::from_secs(900));
        assert_eq!(config.refresh_ttl(), Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_validation_missing_secret() {
        assert_eq!(
            AuthConfig::default().validate(),
            Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"))
        );
    }

    #[test]
    fn test_validation_short_secret() {
        assert_eq!(
            with_secret("too-short").validate(),
            Err(ValidationError::WeakJwtSecret)
        );
    }

    #[test]
    fn test_validation_repetitive_secret() {
        assert_eq!(
            with_secret(&"ab".repeat(32)).validate(),
            Err(ValidationError::WeakJwtSecret)
        );
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(with_secret("k3y-Material-For-Signing-Tokens-0123456789").validate().is_ok());
    }
}
