//! DunningRepository port.

use async_trait::async_trait;

use crate::domain::dunning::Dunning;
use crate::domain::foundation::{DomainError, DunningId, SubscriptionId};

#[async_trait]
pub trait DunningRepository: Send + Sync {
    async fn insert(&self, dunning: &Dunning) -> Result<(), DomainError>;

    /// Compare-and-swap on `version`.
    async fn update(&self, dunning: &mut Dunning) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &DunningId) -> Result<Option<Dunning>, DomainError>;

    /// The subscription's non-terminal dunning run (pending or in progress).
    async fn find_open_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Dunning>, DomainError>;
}
