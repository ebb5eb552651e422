//! GracePeriodRepository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, GracePeriodId, SubscriptionId, Timestamp};
use crate::domain::grace_period::GracePeriod;

#[async_trait]
pub trait GracePeriodRepository: Send + Sync {
    /// # Errors
    ///
    /// `DuplicateEntity` if the subscription already has an active grace period.
    async fn insert(&self, grace: &GracePeriod) -> Result<(), DomainError>;

    /// Compare-and-swap on `version`, see `SubscriptionRepository::update`.
    async fn update(&self, grace: &mut GracePeriod) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &GracePeriodId) -> Result<Option<GracePeriod>, DomainError>;

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<GracePeriod>, DomainError>;

    /// Active grace periods whose `expires_at` is at or before `now`.
    async fn list_overdue(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<GracePeriod>, DomainError>;

    /// Expired grace periods whose subscription is still in grace and has no
    /// newer active period: a sweep stopped between expiring the period and
    /// cancelling the subscription. Settled rows drop out of this listing, so
    /// it has no time window.
    async fn list_expired_unsettled(&self, limit: u32) -> Result<Vec<GracePeriod>, DomainError>;
}
