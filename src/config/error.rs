//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Server host must be an IP address or localhost: {0}")]
    InvalidHost(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Pool of {max_connections} connections is too small for the worker pool; need {needed}")]
    PoolTooSmallForWorkers { max_connections: u32, needed: u32 },

    #[error("JWT secret must be at least 32 bytes with enough distinct characters")]
    WeakJwtSecret,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Key set URL must use HTTPS in production: {0}")]
    KeySetMustBeHttps(&'static str),

    #[error("Invalid scheduler setting: {0}")]
    InvalidScheduler(&'static str),

    #[error("Invalid schedule for {0}: {1}")]
    InvalidSchedule(&'static str, String),

    #[error("Invalid rate limit policy {0}: rate and burst must be positive")]
    InvalidRateLimit(&'static str),

    #[error("Grace period must be between 1 and 30 days")]
    InvalidGracePeriod,

    #[error("Product catalog entry {0} has a negative price")]
    InvalidCatalogEntry(String),
}
