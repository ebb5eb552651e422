//! In-memory GracePeriodRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, GracePeriodId, SubscriptionId, Timestamp};
use crate::domain::grace_period::{GracePeriod, GracePeriodStatus};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::GracePeriodRepository;

use super::{compare_and_swap, InMemorySubscriptionRepository};

#[derive(Debug, Default)]
pub struct InMemoryGracePeriodRepository {
    rows: RwLock<HashMap<GracePeriodId, GracePeriod>>,
    subscriptions: Option<Arc<InMemorySubscriptionRepository>>,
}

impl InMemoryGracePeriodRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads subscription status from `subscriptions` where the SQL adapter
    /// joins. Unlinked, every expired period counts as unsettled.
    pub fn with_subscriptions(mut self, subscriptions: Arc<InMemorySubscriptionRepository>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }
}

#[async_trait]
impl GracePeriodRepository for InMemoryGracePeriodRepository {
    async fn insert(&self, grace: &GracePeriod) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if grace.status == GracePeriodStatus::Active
            && rows.values().any(|g| {
                g.subscription_id == grace.subscription_id && g.status == GracePeriodStatus::Active
            })
        {
            return Err(DomainError::new(
                ErrorCode::DuplicateEntity,
                "Subscription already has an active grace period",
            ));
        }
        rows.insert(grace.id, grace.clone());
        Ok(())
    }

    async fn update(&self, grace: &mut GracePeriod) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let id = grace.id;
        compare_and_swap(&mut rows, &id, grace)
    }

    async fn find_by_id(&self, id: &GracePeriodId) -> Result<Option<GracePeriod>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_active_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<GracePeriod>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|g| &g.subscription_id == subscription_id && g.status == GracePeriodStatus::Active)
            .cloned())
    }

    async fn list_overdue(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<GracePeriod>, DomainError> {
        let mut overdue: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|g| g.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|g| g.expires_at);
        overdue.truncate(limit as usize);
        Ok(overdue)
    }

    async fn list_expired_unsettled(&self, limit: u32) -> Result<Vec<GracePeriod>, DomainError> {
        let mut candidates: Vec<_> = {
            let rows = self.rows.read().await;
            rows.values()
                .filter(|g| {
                    g.status == GracePeriodStatus::Expired
                        && !rows.values().any(|a| {
                            a.subscription_id == g.subscription_id
                                && a.status == GracePeriodStatus::Active
                        })
                })
                .cloned()
                .collect()
        };
        if let Some(subscriptions) = &self.subscriptions {
            let mut unsettled = Vec::with_capacity(candidates.len());
            for grace in candidates {
                if subscriptions.status_of(&grace.subscription_id).await
                    == Some(SubscriptionStatus::Grace)
                {
                    unsettled.push(grace);
                }
            }
            candidates = unsettled;
        }
        candidates.sort_by_key(|g| g.updated_at);
        candidates.truncate(limit as usize);
        Ok(candidates)
    }
}
