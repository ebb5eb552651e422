//! In-memory SubscriptionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::{Platform, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

use super::compare_and_swap;

#[derive(Debug, Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub(crate) async fn status_of(&self, id: &SubscriptionId) -> Option<SubscriptionStatus> {
        self.rows.read().await.get(id).map(|s| s.status)
    }
}

fn is_current(s: &Subscription) -> bool {
    s.deleted_at.is_none()
        && matches!(s.status, SubscriptionStatus::Active | SubscriptionStatus::Grace)
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if is_current(subscription)
            && rows
                .values()
                .any(|s| s.user_id == subscription.user_id && is_current(s))
        {
            return Err(DomainError::new(
                ErrorCode::DuplicateEntity,
                "User already has an active subscription",
            ));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &mut Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let id = subscription.id;
        compare_and_swap(&mut rows, &id, subscription)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|s| &s.user_id == user_id && is_current(s))
            .cloned())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|s| &s.user_id == user_id && s.deleted_at.is_none())
            .max_by_key(|s| (s.updated_at, s.created_at))
            .cloned())
    }

    async fn find_by_provider_id(
        &self,
        source: Platform,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|s| {
                s.source == source
                    && s.provider_subscription_id.as_deref() == Some(provider_subscription_id)
            })
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn count_by_status(&self) -> Result<Vec<(SubscriptionStatus, i64)>, DomainError> {
        let rows = self.rows.read().await;
        let mut counts: HashMap<SubscriptionStatus, i64> = HashMap::new();
        for s in rows.values().filter(|s| s.deleted_at.is_none()) {
            *counts.entry(s.status).or_insert(0) += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.as_str());
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::{NewSubscription, PlanType};

    fn sub(user: &str) -> Subscription {
        let now = Timestamp::from_unix_secs(1_700_000_000);
        Subscription::activate(
            NewSubscription {
                user_id: UserId::new(user).unwrap(),
                plan_type: PlanType::Monthly,
                source: Platform::Stripe,
                product_id: "premium_monthly".to_string(),
                provider_subscription_id: Some(format!("sub_{}", user)),
                expires_at: now.add_days(30),
                auto_renew: true,
            },
            now,
        )
    }

    #[tokio::test]
    async fn second_active_subscription_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        repo.insert(&sub("u1")).await.unwrap();
        let err = repo.insert(&sub("u1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateEntity);
        repo.insert(&sub("u2")).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_subscription_frees_the_slot() {
        let repo = InMemorySubscriptionRepository::new();
        let mut first = sub("u1");
        repo.insert(&first).await.unwrap();
        first.cancel(Timestamp::from_unix_secs(1_700_000_100)).unwrap();
        repo.update(&mut first).await.unwrap();
        repo.insert(&sub("u1")).await.unwrap();
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let repo = InMemorySubscriptionRepository::new();
        let original = sub("u1");
        repo.insert(&original).await.unwrap();

        let mut a = original.clone();
        let mut b = original.clone();
        a.set_auto_renew(false, Timestamp::from_unix_secs(1_700_000_100));
        repo.update(&mut a).await.unwrap();
        assert_eq!(a.version, 2);

        b.cancel(Timestamp::from_unix_secs(1_700_000_200)).unwrap();
        let err = repo.update(&mut b).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConcurrencyConflict);
        assert_eq!(b.version, 1);
    }

    #[tokio::test]
    async fn lookups() {
        let repo = InMemorySubscriptionRepository::new();
        let s = sub("u1");
        repo.insert(&s).await.unwrap();
        let user = UserId::new("u1").unwrap();
        assert_eq!(repo.find_current_for_user(&user).await.unwrap().unwrap().id, s.id);
        assert_eq!(repo.find_latest_for_user(&user).await.unwrap().unwrap().id, s.id);
        assert!(repo
            .find_by_provider_id(Platform::Stripe, "sub_u1")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_by_provider_id(Platform::Ios, "sub_u1")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            repo.count_by_status().await.unwrap(),
            vec![(SubscriptionStatus::Active, 1)]
        );
    }
}
