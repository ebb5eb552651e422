//! PostgreSQL adapters - Database implementations for the persistence ports.
//!
//! Every versioned aggregate is updated with `WHERE id = $1 AND version = $2`;
//! zero affected rows means either the row is gone or another writer won.

mod dunning_repository;
mod grace_period_repository;
mod subscription_repository;
mod task_store;
mod transaction_repository;
mod webhook_event_repository;
mod winback_repository;

pub use dunning_repository::PostgresDunningRepository;
pub use grace_period_repository::PostgresGracePeriodRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use task_store::PostgresTaskStore;
pub use transaction_repository::PostgresTransactionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
pub use winback_repository::PostgresWinbackRepository;

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Opens the pool and applies pending migrations from `migrations/`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    tracing::info!(url = %config.redacted_url(), "Connecting to database...");
    let options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| db_error("parse database URL", e))?
        .options([("statement_timeout", config.statement_timeout_ms.to_string())]);
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect_with(options)
        .await
        .map_err(|e| db_error("connect to database", e))?;

    tracing::info!(
        max_connections = config.max_connections,
        statement_timeout_ms = config.statement_timeout_ms,
        "Database connected successfully"
    );

    if config.run_migrations {
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let migrator = sqlx::migrate::Migrator::new(migrations_dir)
            .await
            .map_err(|e| DomainError::database(format!("Failed to load migrations: {}", e)))?;
        migrator
            .run(&pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}

pub(crate) fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

/// True when `e` is a violation of the named unique constraint or index.
pub(crate) fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

/// Parses a text column into a domain enum.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value '{}': {}", column, value, e),
        )
    })
}

pub(crate) fn parse_user_id(value: String) -> Result<UserId, DomainError> {
    UserId::new(value)
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e)))
}

/// Distinguishes a lost compare-and-swap from a missing row.
pub(crate) async fn cas_failure(
    pool: &PgPool,
    table: &'static str,
    entity: &'static str,
    id: &Uuid,
) -> DomainError {
    let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    match sqlx::query_scalar::<_, bool>(&query).bind(id).fetch_one(pool).await {
        Ok(true) => DomainError::conflict(entity),
        Ok(false) => DomainError::new(ErrorCode::NotFound, format!("{} not found", entity))
            .with_detail("id", id.to_string()),
        Err(e) => db_error("check row existence", e),
    }
}
