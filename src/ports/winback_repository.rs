//! WinbackRepository port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, WinbackOfferId};
use crate::domain::winback::WinbackOffer;

#[async_trait]
pub trait WinbackRepository: Send + Sync {
    async fn insert(&self, offer: &WinbackOffer) -> Result<(), DomainError>;

    /// Compare-and-swap on `version`.
    async fn update(&self, offer: &mut WinbackOffer) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &WinbackOfferId) -> Result<Option<WinbackOffer>, DomainError>;

    /// Offers still `offered` whose deadline is at or before `now`.
    async fn list_expirable(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WinbackOffer>, DomainError>;
}
