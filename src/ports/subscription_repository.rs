//! SubscriptionRepository port - persistence for subscriptions.
//!
//! Updates are compare-and-swap on `version`: the stored row must still carry
//! the version the caller read, otherwise the update fails with
//! `ConcurrencyConflict` and the caller re-reads.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use crate::domain::subscription::{Platform, Subscription, SubscriptionStatus};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a new subscription.
    ///
    /// # Errors
    ///
    /// `DuplicateEntity` if the user already has an active subscription.
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Persists changes, bumping `version` on success.
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` when the stored version differs.
    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// The user's current non-terminal subscription (active or in grace).
    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// The user's most recently updated subscription in any status.
    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn find_by_provider_id(
        &self,
        source: Platform,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Counts of non-deleted subscriptions per status.
    async fn count_by_status(&self) -> Result<Vec<(SubscriptionStatus, i64)>, DomainError>;
}
