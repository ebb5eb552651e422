//! In-memory WinbackRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp, WinbackOfferId};
use crate::domain::winback::{WinbackOffer, WinbackStatus};
use crate::ports::WinbackRepository;

use super::compare_and_swap;

#[derive(Debug, Default)]
pub struct InMemoryWinbackRepository {
    rows: RwLock<HashMap<WinbackOfferId, WinbackOffer>>,
}

impl InMemoryWinbackRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WinbackRepository for InMemoryWinbackRepository {
    async fn insert(&self, offer: &WinbackOffer) -> Result<(), DomainError> {
        self.rows.write().await.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn update(&self, offer: &mut WinbackOffer) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let id = offer.id;
        compare_and_swap(&mut rows, &id, offer)
    }

    async fn find_by_id(&self, id: &WinbackOfferId) -> Result<Option<WinbackOffer>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn list_expirable(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WinbackOffer>, DomainError> {
        let mut due: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|o| o.status == WinbackStatus::Offered && !now.is_before(&o.expires_at))
            .cloned()
            .collect();
        due.sort_by_key(|o| o.expires_at);
        due.truncate(limit as usize);
        Ok(due)
    }
}
