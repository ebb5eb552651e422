//! CancelSubscriptionHandler - explicit user cancel.

use std::sync::Arc;

use serde_json::json;

use crate::application::handlers::jobs::TaskEnqueuer;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::jobs::{NewTask, TaskType};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    /// False when the subscription had already ended.
    pub cancelled_now: bool,
}

/// Cancels the user's subscription immediately.
///
/// Cancelling is terminal and forces `auto_renew` off. Repeating the request
/// returns the already-ended subscription unchanged.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    enqueuer: TaskEnqueuer,
}

impl CancelSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, enqueuer: TaskEnqueuer) -> Self {
        Self {
            subscriptions,
            enqueuer,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
        now: Timestamp,
    ) -> Result<CancelSubscriptionResult, DomainError> {
        let current = match self.subscriptions.find_current_for_user(&cmd.user_id).await? {
            Some(current) => Some(current),
            None => self.subscriptions.find_latest_for_user(&cmd.user_id).await?,
        };
        let mut subscription = current.ok_or_else(|| {
            DomainError::new(ErrorCode::SubscriptionNotFound, "no subscription for user")
        })?;

        let cancelled_now = subscription.cancel(now)?;
        if cancelled_now {
            self.subscriptions.update(&mut subscription).await?;
            tracing::info!(
                subscription_id = %subscription.id,
                user_id = %cmd.user_id,
                "Subscription cancelled by user"
            );
            self.enqueuer
                .enqueue_follow_up(
                    NewTask::new(
                        TaskType::NotificationSend,
                        json!({
                            "user_id": cmd.user_id.as_str(),
                            "template": "subscription_cancelled",
                        }),
                    ),
                    now,
                )
                .await;
        }

        Ok(CancelSubscriptionResult {
            subscription,
            cancelled_now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryTaskStore};
    use crate::domain::subscription::{NewSubscription, Platform, PlanType, SubscriptionStatus};

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    async fn setup() -> (Arc<InMemorySubscriptionRepository>, CancelSubscriptionHandler) {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let sub = Subscription::activate(
            NewSubscription {
                user_id: UserId::new("user-1").unwrap(),
                plan_type: PlanType::Annual,
                source: Platform::Stripe,
                product_id: "premium_annual".to_string(),
                provider_subscription_id: None,
                expires_at: now().add_days(365),
                auto_renew: true,
            },
            now(),
        );
        repo.insert(&sub).await.unwrap();
        let handler = CancelSubscriptionHandler::new(
            repo.clone(),
            TaskEnqueuer::new(Arc::new(InMemoryTaskStore::new()), 5),
        );
        (repo, handler)
    }

    fn cmd(user: &str) -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            user_id: UserId::new(user).unwrap(),
        }
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_disables_auto_renew() {
        let (repo, handler) = setup().await;

        let result = handler.handle(cmd("user-1"), now()).await.unwrap();

        assert!(result.cancelled_now);
        assert_eq!(result.subscription.status, SubscriptionStatus::Cancelled);
        assert!(!result.subscription.auto_renew);
        let user = UserId::new("user-1").unwrap();
        assert!(repo.find_current_for_user(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelling_twice_is_a_no_op() {
        let (_, handler) = setup().await;
        let first = handler.handle(cmd("user-1"), now()).await.unwrap();

        let second = handler.handle(cmd("user-1"), now()).await.unwrap();

        assert!(!second.cancelled_now);
        assert_eq!(second.subscription.version, first.subscription.version);
    }

    #[tokio::test]
    async fn user_without_subscription_is_not_found() {
        let (_, handler) = setup().await;
        let err = handler.handle(cmd("user-2"), now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }
}
