//! StartGracePeriodHandler - renewal failure: grace period plus dunning.
//!
//! Steps run in a fixed order (subscription, grace period, dunning) and each
//! is skipped when already done, so a re-run after a crash completes the
//! missing steps. A failure on a subscription whose grace period already
//! exists counts as another dunning attempt.

use std::sync::Arc;

use serde_json::json;

use crate::application::handlers::jobs::TaskEnqueuer;
use crate::domain::dunning::{Dunning, DunningStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::grace_period::GracePeriod;
use crate::domain::jobs::{NewTask, TaskType};
use crate::domain::subscription::Subscription;
use crate::ports::{DunningRepository, GracePeriodRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct StartGracePeriodCommand {
    pub subscription_id: SubscriptionId,
    /// Provider's failure code, kept on the dunning record.
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct StartGracePeriodResult {
    pub subscription: Subscription,
    pub grace_period: GracePeriod,
    pub dunning: Dunning,
    /// False when the grace period already existed.
    pub started: bool,
}

pub struct StartGracePeriodHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    grace_periods: Arc<dyn GracePeriodRepository>,
    dunning: Arc<dyn DunningRepository>,
    enqueuer: TaskEnqueuer,
    grace_period_days: i64,
    dunning_max_attempts: u32,
}

impl StartGracePeriodHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        grace_periods: Arc<dyn GracePeriodRepository>,
        dunning: Arc<dyn DunningRepository>,
        enqueuer: TaskEnqueuer,
        grace_period_days: i64,
        dunning_max_attempts: u32,
    ) -> Self {
        Self {
            subscriptions,
            grace_periods,
            dunning,
            enqueuer,
            grace_period_days,
            dunning_max_attempts,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartGracePeriodCommand,
        now: Timestamp,
    ) -> Result<StartGracePeriodResult, DomainError> {
        let mut subscription = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "subscription not found")
                    .with_detail("subscription_id", cmd.subscription_id.to_string())
            })?;

        if subscription.enter_grace(now)? {
            self.subscriptions.update(&mut subscription).await?;
        }

        let (grace_period, started) = self.ensure_grace_period(&subscription, now).await?;
        let dunning = self
            .advance_dunning(&subscription, started, &cmd.reason, now)
            .await?;

        if started {
            tracing::info!(
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                grace_expires_at = %grace_period.expires_at,
                "Grace period started"
            );
            self.enqueuer
                .enqueue_follow_up(
                    NewTask::new(
                        TaskType::NotificationSend,
                        json!({
                            "user_id": subscription.user_id.as_str(),
                            "template": "payment_failed",
                            "grace_expires_at": grace_period.expires_at,
                        }),
                    ),
                    now,
                )
                .await;
        }

        Ok(StartGracePeriodResult {
            subscription,
            grace_period,
            dunning,
            started,
        })
    }

    async fn ensure_grace_period(
        &self,
        subscription: &Subscription,
        now: Timestamp,
    ) -> Result<(GracePeriod, bool), DomainError> {
        if let Some(existing) = self
            .grace_periods
            .find_active_for_subscription(&subscription.id)
            .await?
        {
            return Ok((existing, false));
        }

        let grace = GracePeriod::start(
            subscription.user_id.clone(),
            subscription.id,
            self.grace_period_days,
            now,
        )?;
        match self.grace_periods.insert(&grace).await {
            Ok(()) => Ok((grace, true)),
            Err(e) if e.code == ErrorCode::DuplicateEntity => {
                // Lost the race to a concurrent failure signal.
                let existing = self
                    .grace_periods
                    .find_active_for_subscription(&subscription.id)
                    .await?
                    .ok_or_else(|| DomainError::conflict("grace_period"))?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    async fn advance_dunning(
        &self,
        subscription: &Subscription,
        grace_started: bool,
        reason: &str,
        now: Timestamp,
    ) -> Result<Dunning, DomainError> {
        match self
            .dunning
            .find_open_for_subscription(&subscription.id)
            .await?
        {
            Some(existing) if grace_started => Ok(existing),
            Some(mut existing) => {
                let status = existing.record_failure(reason, now)?;
                self.dunning.update(&mut existing).await?;
                if status == DunningStatus::Failed {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        attempts = existing.attempt_count,
                        "Dunning exhausted without recovery"
                    );
                }
                Ok(existing)
            }
            None => {
                let mut opened = Dunning::open(
                    subscription.id,
                    subscription.user_id.clone(),
                    self.dunning_max_attempts,
                    now,
                );
                opened.last_failure_reason = Some(reason.to_string());
                self.dunning.insert(&opened).await?;
                Ok(opened)
            }
        }
    }
}
