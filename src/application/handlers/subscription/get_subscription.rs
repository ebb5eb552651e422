//! GetSubscriptionHandler - the caller's current subscription.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{PlanType, Platform, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

/// Subscription as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    pub id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub plan_type: PlanType,
    pub source: Platform,
    pub product_id: String,
    pub expires_at: Timestamp,
    pub auto_renew: bool,
    pub has_access: bool,
    pub days_remaining: i64,
}

impl SubscriptionView {
    pub fn of(subscription: &Subscription, now: Timestamp) -> Self {
        Self {
            id: subscription.id,
            status: subscription.status,
            plan_type: subscription.plan_type,
            source: subscription.source,
            product_id: subscription.product_id.clone(),
            expires_at: subscription.expires_at,
            auto_renew: subscription.auto_renew,
            has_access: subscription.has_access(now),
            days_remaining: subscription.days_remaining(now),
        }
    }
}

/// `None` when the user never subscribed.
pub type GetSubscriptionResult = Option<SubscriptionView>;

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    /// Prefers the current subscription, falling back to the latest ended one.
    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
        now: Timestamp,
    ) -> Result<GetSubscriptionResult, DomainError> {
        let subscription = match self.subscriptions.find_current_for_user(&query.user_id).await? {
            Some(current) => Some(current),
            None => self.subscriptions.find_latest_for_user(&query.user_id).await?,
        };
        Ok(subscription.map(|s| SubscriptionView::of(&s, now)))
    }
}
