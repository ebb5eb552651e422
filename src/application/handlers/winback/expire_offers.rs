//! ExpireWinbackOffersHandler - closes open offers past their deadline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{Task, TaskError};
use crate::ports::{TaskHandler, WinbackRepository};

pub struct ExpireWinbackOffersHandler {
    offers: Arc<dyn WinbackRepository>,
    batch_size: u32,
}

impl ExpireWinbackOffersHandler {
    pub fn new(offers: Arc<dyn WinbackRepository>, batch_size: u32) -> Self {
        Self {
            offers,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns how many offers were expired.
    pub async fn sweep(&self, now: Timestamp) -> Result<u32, DomainError> {
        let mut expired = 0;
        for mut offer in self.offers.list_expirable(now, self.batch_size).await? {
            if !offer.expire_if_due(now) {
                continue;
            }
            match self.offers.update(&mut offer).await {
                Ok(()) => expired += 1,
                // Answered between listing and update; the answer stands.
                Err(e) => tracing::debug!(winback_offer_id = %offer.id, error = %e, "Skipped offer expiry"),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "Winback offers expired");
        }
        Ok(expired)
    }
}

#[async_trait]
impl TaskHandler for ExpireWinbackOffersHandler {
    async fn handle(&self, _task: &Task) -> Result<(), TaskError> {
        self.sweep(Timestamp::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryWinbackRepository;
    use crate::domain::foundation::UserId;
    use crate::domain::winback::{Discount, DiscountType, WinbackOffer, WinbackStatus};

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    fn offer(user: &str, days: i64) -> WinbackOffer {
        WinbackOffer::offer(
            UserId::new(user).unwrap(),
            "campaign",
            Discount::new(DiscountType::Percentage, 20).unwrap(),
            days,
            now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn expires_only_open_offers_past_deadline() {
        let repo = Arc::new(InMemoryWinbackRepository::new());
        let due = offer("user-1", 1);
        let running = offer("user-2", 30);
        let mut accepted = offer("user-3", 1);
        repo.insert(&due).await.unwrap();
        repo.insert(&running).await.unwrap();
        repo.insert(&accepted).await.unwrap();
        accepted.accept(now()).unwrap();
        repo.update(&mut accepted).await.unwrap();

        let handler = ExpireWinbackOffersHandler::new(repo.clone(), 100);
        let expired = handler.sweep(now().add_days(2)).await.unwrap();

        assert_eq!(expired, 1);
        let stored = repo.find_by_id(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WinbackStatus::Expired);
        let stored = repo.find_by_id(&accepted.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WinbackStatus::Accepted);

        assert_eq!(handler.sweep(now().add_days(2)).await.unwrap(), 0);
    }
}
