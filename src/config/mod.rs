//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SUBSCRIPTION_CORE__` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use subscription_core::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr());
//! ```

mod auth;
mod catalog;
mod database;
mod error;
mod integrations;
mod rate_limits;
mod redis;
mod scheduler;
mod server;
mod webhooks;

pub use auth::{AuthConfig, MIN_JWT_SECRET_BYTES};
pub use catalog::CatalogConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use integrations::IntegrationsConfig;
pub use rate_limits::{FailMode, KeyStrategy, RateLimitsConfig, RouteClass, RoutePolicy};
pub use redis::RedisConfig;
pub use scheduler::{RecurringSchedules, RecurringTask, SchedulerConfig};
pub use server::{Environment, ServerConfig};
pub use webhooks::WebhooksConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Redis configuration (revocation list, rate buckets, snapshots)
    pub redis: RedisConfig,

    /// Token signing configuration
    pub auth: AuthConfig,

    /// Provider verification for incoming webhooks
    pub webhooks: WebhooksConfig,

    /// Worker pool and recurring tasks
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-route rate limit policies
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Products, grace period length, dunning attempts
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Receipt verifier and exchange rate endpoints
    pub integrations: IntegrationsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SUBSCRIPTION_CORE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SUBSCRIPTION_CORE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SUBSCRIPTION_CORE__RATE_LIMITS__POLLING__BURST=20` -> `rate_limits.polling.burst = 20`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_CORE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("catalog.fx_base_currencies")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.auth.validate()?;
        self.webhooks.validate(&self.server.environment)?;
        self.scheduler.validate()?;
        if self.scheduler.enabled {
            self.database.validate_for_workers(self.scheduler.workers)?;
        }
        self.rate_limits.validate()?;
        self.catalog.validate()?;
        self.integrations.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[(&str, &str)] = &[
        ("SUBSCRIPTION_CORE__DATABASE__URL", "postgresql://test@localhost/test"),
        ("SUBSCRIPTION_CORE__REDIS__URL", "redis://localhost:6379"),
        (
            "SUBSCRIPTION_CORE__AUTH__JWT_SECRET",
            "k3y-Material-For-Signing-Tokens-0123456789",
        ),
        ("SUBSCRIPTION_CORE__WEBHOOKS__STRIPE_WEBHOOK_SECRET", "whsec_test"),
        ("SUBSCRIPTION_CORE__WEBHOOKS__GOOGLE_AUDIENCE", "https://api.example.com/webhook/google"),
        (
            "SUBSCRIPTION_CORE__INTEGRATIONS__RECEIPT_VERIFIER_URL",
            "http://verifier:8081/verify",
        ),
    ];

    const OPTIONAL: &[&str] = &[
        "SUBSCRIPTION_CORE__SERVER__PORT",
        "SUBSCRIPTION_CORE__SERVER__ENVIRONMENT",
        "SUBSCRIPTION_CORE__SCHEDULER__WORKERS",
        "SUBSCRIPTION_CORE__RATE_LIMITS__POLLING__BURST",
    ];

    fn set_minimal_env() {
        for (key, value) in VARS {
            env::set_var(key, value);
        }
    }

    fn clear_env() {
        for (key, _) in VARS {
            env::remove_var(key);
        }
        for key in OPTIONAL {
            env::remove_var(key);
        }
    }

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        set_minimal_env();
        for (key, value) in extra {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.catalog.grace_period_days, 16);
    }

    #[test]
    fn test_validate_full_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[
            ("SUBSCRIPTION_CORE__SERVER__PORT", "3000"),
            ("SUBSCRIPTION_CORE__SCHEDULER__WORKERS", "8"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.scheduler.workers, 8);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("SUBSCRIPTION_CORE__SERVER__ENVIRONMENT", "production")]).unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_missing_secret_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::remove_var("SUBSCRIPTION_CORE__AUTH__JWT_SECRET");
        let result = AppConfig::load();
        clear_env();
        assert!(result.is_err());
    }
}
