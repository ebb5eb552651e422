//! ExpireGracePeriodsHandler - the recurring grace expiry sweep.
//!
//! For each overdue period: expire the period, then cancel the subscription.
//! A crash between the two steps leaves an expired period over a subscription
//! still in grace; the heal pass finds those and finishes the cancel. Both
//! steps are no-ops when already done, so overlapping runs are safe.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::application::handlers::jobs::TaskEnqueuer;
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::domain::grace_period::GracePeriod;
use crate::domain::jobs::{NewTask, Task, TaskError, TaskType};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::{GracePeriodRepository, SubscriptionRepository, TaskHandler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraceSweepReport {
    pub expired: u32,
    pub cancelled: u32,
    pub healed: u32,
    pub failed: u32,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPayload {
    #[serde(default)]
    batch_size: Option<u32>,
}

pub struct ExpireGracePeriodsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    grace_periods: Arc<dyn GracePeriodRepository>,
    enqueuer: TaskEnqueuer,
    batch_size: u32,
}

impl ExpireGracePeriodsHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        grace_periods: Arc<dyn GracePeriodRepository>,
        enqueuer: TaskEnqueuer,
        batch_size: u32,
    ) -> Self {
        Self {
            subscriptions,
            grace_periods,
            enqueuer,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one sweep.
    ///
    /// Listing failures abort the run; per-period failures are logged and
    /// counted so one bad row does not stall the rest.
    pub async fn sweep(&self, now: Timestamp, batch_size: u32) -> Result<GraceSweepReport, DomainError> {
        let mut report = GraceSweepReport::default();

        for grace in self.grace_periods.list_overdue(now, batch_size).await? {
            let grace_id = grace.id;
            match self.expire_one(grace, now).await {
                Ok(cancelled) => {
                    report.expired += 1;
                    if cancelled {
                        report.cancelled += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(grace_period_id = %grace_id, error = %e, "Failed to expire grace period");
                }
            }
        }

        for grace in self.grace_periods.list_expired_unsettled(batch_size).await? {
            match self.cancel_backing_subscription(&grace.subscription_id, now).await {
                Ok(true) => {
                    report.healed += 1;
                    tracing::info!(
                        grace_period_id = %grace.id,
                        subscription_id = %grace.subscription_id,
                        "Finished cancel for previously expired grace period"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(grace_period_id = %grace.id, error = %e, "Failed to heal expired grace period");
                }
            }
        }

        if report != GraceSweepReport::default() {
            tracing::info!(
                expired = report.expired,
                cancelled = report.cancelled,
                healed = report.healed,
                failed = report.failed,
                "Grace expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_one(&self, mut grace: GracePeriod, now: Timestamp) -> Result<bool, DomainError> {
        if grace.expire(now)? {
            self.grace_periods.update(&mut grace).await?;
        }
        let cancelled = self
            .cancel_backing_subscription(&grace.subscription_id, now)
            .await?;
        if cancelled {
            self.enqueuer
                .enqueue_follow_up(
                    NewTask::new(
                        TaskType::NotificationSend,
                        json!({
                            "user_id": grace.user_id.as_str(),
                            "template": "subscription_lapsed",
                        }),
                    ),
                    now,
                )
                .await;
        }
        Ok(cancelled)
    }

    /// Cancels the subscription if it is still in grace.
    async fn cancel_backing_subscription(
        &self,
        subscription_id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let Some(mut subscription) = self.subscriptions.find_by_id(subscription_id).await? else {
            tracing::warn!(subscription_id = %subscription_id, "Grace period references missing subscription");
            return Ok(false);
        };
        if subscription.status != SubscriptionStatus::Grace {
            return Ok(false);
        }
        // A later failure may have opened a fresh period for the same subscription.
        if self
            .grace_periods
            .find_active_for_subscription(subscription_id)
            .await?
            .is_some_and(|active| !active.is_overdue(now))
        {
            return Ok(false);
        }
        let changed = subscription.cancel(now)?;
        if changed {
            self.subscriptions.update(&mut subscription).await?;
        }
        Ok(changed)
    }
}

#[async_trait]
impl TaskHandler for ExpireGracePeriodsHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: SweepPayload = if task.payload.is_null() {
            SweepPayload::default()
        } else {
            task.payload_as()
                .map_err(|e| TaskError::unrecoverable(format!("invalid payload: {}", e)))?
        };
        let batch_size = payload.batch_size.unwrap_or(self.batch_size).max(1);
        self.sweep(Timestamp::now(), batch_size).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryGracePeriodRepository, InMemorySubscriptionRepository, InMemoryTaskStore,
    };
    use crate::domain::foundation::{ErrorCode, UserId};
    use crate::domain::grace_period::GracePeriodStatus;
    use crate::domain::subscription::{NewSubscription, Platform, PlanType, Subscription};

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        grace_periods: Arc<InMemoryGracePeriodRepository>,
        handler: ExpireGracePeriodsHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let grace_periods =
            Arc::new(InMemoryGracePeriodRepository::new().with_subscriptions(subscriptions.clone()));
        let handler = ExpireGracePeriodsHandler::new(
            subscriptions.clone(),
            grace_periods.clone(),
            TaskEnqueuer::new(Arc::new(InMemoryTaskStore::new()), 5),
            100,
        );
        Fixture {
            subscriptions,
            grace_periods,
            handler,
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    async fn in_grace(f: &Fixture, user: &str, days: i64) -> (Subscription, GracePeriod) {
        let mut sub = Subscription::activate(
            NewSubscription {
                user_id: UserId::new(user).unwrap(),
                plan_type: PlanType::Monthly,
                source: Platform::Stripe,
                product_id: "premium_monthly".to_string(),
                provider_subscription_id: None,
                expires_at: now(),
                auto_renew: true,
            },
            now(),
        );
        sub.enter_grace(now()).unwrap();
        f.subscriptions.insert(&sub).await.unwrap();
        let grace = GracePeriod::start(sub.user_id.clone(), sub.id, days, now()).unwrap();
        f.grace_periods.insert(&grace).await.unwrap();
        (sub, grace)
    }

    #[tokio::test]
    async fn overdue_period_expires_and_cancels_subscription() {
        let f = fixture();
        let (sub, grace) = in_grace(&f, "user-1", 1).await;

        let report = f.handler.sweep(now().add_days(2), 100).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.cancelled, 1);
        let stored_grace = f.grace_periods.find_by_id(&grace.id).await.unwrap().unwrap();
        assert_eq!(stored_grace.status, GracePeriodStatus::Expired);
        let stored_sub = f.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored_sub.status, SubscriptionStatus::Cancelled);
        assert!(!stored_sub.auto_renew);
    }

    #[tokio::test]
    async fn periods_still_running_are_untouched() {
        let f = fixture();
        let (sub, _) = in_grace(&f, "user-1", 16).await;

        let report = f.handler.sweep(now().add_days(2), 100).await.unwrap();

        assert_eq!(report, GraceSweepReport::default());
        let stored = f.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Grace);
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let f = fixture();
        in_grace(&f, "user-1", 1).await;
        f.handler.sweep(now().add_days(2), 100).await.unwrap();

        let again = f.handler.sweep(now().add_days(2), 100).await.unwrap();
        assert_eq!(again, GraceSweepReport::default());
    }

    #[tokio::test]
    async fn crash_between_steps_heals_on_next_run() {
        let f = fixture();
        let (sub, mut grace) = in_grace(&f, "user-1", 1).await;
        let sweep_at = now().add_days(2);
        // First run died after expiring the period.
        grace.expire(sweep_at).unwrap();
        f.grace_periods.update(&mut grace).await.unwrap();

        let report = f.handler.sweep(sweep_at, 100).await.unwrap();

        assert_eq!(report.healed, 1);
        let stored = f.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn half_finished_expiry_heals_after_a_long_outage() {
        let f = fixture();
        let (sub, mut grace) = in_grace(&f, "user-1", 1).await;
        grace.expire(now().add_days(2)).unwrap();
        f.grace_periods.update(&mut grace).await.unwrap();

        // Workers were down for days before the next sweep.
        let report = f.handler.sweep(now().add_days(9), 100).await.unwrap();

        assert_eq!(report.healed, 1);
        let stored = f.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn settled_expiries_do_not_crowd_out_the_heal_batch() {
        let f = fixture();
        for user in ["user-1", "user-2"] {
            in_grace(&f, user, 1).await;
        }
        f.handler.sweep(now().add_days(2), 100).await.unwrap();

        let (sub, mut grace) = in_grace(&f, "user-3", 1).await;
        grace.expire(now().add_days(3)).unwrap();
        f.grace_periods.update(&mut grace).await.unwrap();

        let report = f.handler.sweep(now().add_days(3), 2).await.unwrap();

        assert_eq!(report.healed, 1);
        let stored = f.subscriptions.find_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    }

    #[tokio::test]
    async fn expired_period_cannot_be_resolved_afterwards() {
        let f = fixture();
        let (_, grace) = in_grace(&f, "user-1", 1).await;
        f.handler.sweep(now().add_days(2), 100).await.unwrap();

        let mut stored = f.grace_periods.find_by_id(&grace.id).await.unwrap().unwrap();
        let err = stored.resolve(now().add_days(3)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(err.message, "cannot resolve expired grace period");
    }

    #[tokio::test]
    async fn batch_size_bounds_one_run() {
        let f = fixture();
        for user in ["user-1", "user-2", "user-3"] {
            in_grace(&f, user, 1).await;
        }

        let first = f.handler.sweep(now().add_days(2), 2).await.unwrap();
        let second = f.handler.sweep(now().add_days(2), 2).await.unwrap();

        assert_eq!(first.expired, 2);
        assert_eq!(second.expired, 1);
    }

    #[tokio::test]
    async fn task_handler_accepts_empty_payload() {
        let f = fixture();
        let task = Task::from_new(
            NewTask::new(TaskType::GraceExpirySweep, json!({})),
            3,
            Timestamp::now(),
        );
        assert!(f.handler.handle(&task).await.is_ok());
    }

    #[tokio::test]
    async fn task_handler_rejects_malformed_payload() {
        let f = fixture();
        let task = Task::from_new(
            NewTask::new(TaskType::GraceExpirySweep, json!({"batch_size": "lots"})),
            3,
            Timestamp::now(),
        );
        let err = f.handler.handle(&task).await.unwrap_err();
        assert!(!err.is_recoverable());
    }
}
