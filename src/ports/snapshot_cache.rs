//! SnapshotCache port - derived values (LTV, daily analytics, FX rates).
//!
//! Everything stored here can be recomputed from the database; losing it is
//! never a correctness problem.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::DomainError;

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn put(&self, key: &str, value: &serde_json::Value, ttl: Duration)
        -> Result<(), DomainError>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DomainError>;
}

/// Key namespaces.
pub mod keys {
    use chrono::NaiveDate;

    use crate::domain::foundation::UserId;

    pub fn ltv(user_id: &UserId) -> String {
        format!("ltv:{}", user_id)
    }

    pub fn daily_analytics(date: NaiveDate) -> String {
        format!("analytics:daily:{}", date.format("%Y-%m-%d"))
    }

    pub fn fx(base: &str) -> String {
        format!("fx:{}", base.to_ascii_uppercase())
    }

    pub fn bandit_arms(experiment: &str) -> String {
        format!("bandit:arms:{}", experiment)
    }

    pub fn bandit_assignment(experiment: &str, user_id: &UserId) -> String {
        format!("bandit:assign:{}:{}", experiment, user_id)
    }

}
