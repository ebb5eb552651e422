//! In-memory DunningRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::dunning::Dunning;
use crate::domain::foundation::{DomainError, DunningId, ErrorCode, SubscriptionId};
use crate::ports::DunningRepository;

use super::compare_and_swap;

#[derive(Debug, Default)]
pub struct InMemoryDunningRepository {
    rows: RwLock<HashMap<DunningId, Dunning>>,
}

impl InMemoryDunningRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DunningRepository for InMemoryDunningRepository {
    async fn insert(&self, dunning: &Dunning) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if !dunning.is_terminal()
            && rows
                .values()
                .any(|d| d.subscription_id == dunning.subscription_id && !d.is_terminal())
        {
            return Err(DomainError::new(
                ErrorCode::DuplicateEntity,
                "Subscription already has an open dunning run",
            ));
        }
        rows.insert(dunning.id, dunning.clone());
        Ok(())
    }

    async fn update(&self, dunning: &mut Dunning) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let id = dunning.id;
        compare_and_swap(&mut rows, &id, dunning)
    }

    async fn find_by_id(&self, id: &DunningId) -> Result<Option<Dunning>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_open_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Dunning>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|d| &d.subscription_id == subscription_id && !d.is_terminal())
            .cloned())
    }
}
