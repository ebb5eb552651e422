//! ResolveGracePeriodHandler - payment recovered during grace.
//!
//! The grace period is resolved before the subscription is touched, so a
//! period the sweep already expired blocks reactivation.

use std::sync::Arc;

use crate::domain::foundation::{
    DomainError, ErrorCode, GracePeriodId, SubscriptionId, Timestamp,
};
use crate::domain::grace_period::GracePeriod;
use crate::domain::subscription::Subscription;
use crate::ports::{DunningRepository, GracePeriodRepository, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct ResolveGracePeriodCommand {
    pub grace_period_id: GracePeriodId,
    /// New paid-through date reported with the recovered charge.
    pub new_expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct ResolveGracePeriodResult {
    pub subscription: Subscription,
    pub grace_period: Option<GracePeriod>,
}

pub struct ResolveGracePeriodHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    grace_periods: Arc<dyn GracePeriodRepository>,
    dunning: Arc<dyn DunningRepository>,
}

impl ResolveGracePeriodHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        grace_periods: Arc<dyn GracePeriodRepository>,
        dunning: Arc<dyn DunningRepository>,
    ) -> Self {
        Self {
            subscriptions,
            grace_periods,
            dunning,
        }
    }

    pub async fn handle(
        &self,
        cmd: ResolveGracePeriodCommand,
        now: Timestamp,
    ) -> Result<ResolveGracePeriodResult, DomainError> {
        let grace = self
            .grace_periods
            .find_by_id(&cmd.grace_period_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::GracePeriodNotFound, "grace period not found")
                    .with_detail("grace_period_id", cmd.grace_period_id.to_string())
            })?;
        let subscription_id = grace.subscription_id;
        let grace = self.resolve_period(grace, now).await?;
        let subscription = self
            .resolve_subscription(&subscription_id, cmd.new_expires_at, now)
            .await?;

        Ok(ResolveGracePeriodResult {
            subscription,
            grace_period: Some(grace),
        })
    }

    /// Resolves whatever grace state the subscription is in.
    ///
    /// A subscription in grace without an active period (crash before the
    /// period was written) is still returned to active.
    pub async fn resolve_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
        new_expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<ResolveGracePeriodResult, DomainError> {
        let grace = match self
            .grace_periods
            .find_active_for_subscription(subscription_id)
            .await?
        {
            Some(grace) => Some(self.resolve_period(grace, now).await?),
            None => None,
        };
        let subscription = self
            .resolve_subscription(subscription_id, new_expires_at, now)
            .await?;

        Ok(ResolveGracePeriodResult {
            subscription,
            grace_period: grace,
        })
    }

    async fn resolve_period(
        &self,
        mut grace: GracePeriod,
        now: Timestamp,
    ) -> Result<GracePeriod, DomainError> {
        if grace.resolve(now)? {
            self.grace_periods.update(&mut grace).await?;
        }
        Ok(grace)
    }

    async fn resolve_subscription(
        &self,
        subscription_id: &SubscriptionId,
        new_expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        let mut subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "subscription not found")
                    .with_detail("subscription_id", subscription_id.to_string())
            })?;

        let reactivated = subscription.resolve_grace(new_expires_at, now)?;
        let extended = match new_expires_at {
            Some(expires_at) if !reactivated => subscription.renew(expires_at, now)?,
            _ => false,
        };
        if reactivated || extended {
            self.subscriptions.update(&mut subscription).await?;
        }

        if let Some(mut dunning) = self
            .dunning
            .find_open_for_subscription(subscription_id)
            .await?
        {
            if dunning.recover(now)? {
                self.dunning.update(&mut dunning).await?;
            }
        }

        if reactivated {
            tracing::info!(
                subscription_id = %subscription.id,
                expires_at = %subscription.expires_at,
                "Grace period resolved"
            );
        }
        Ok(subscription)
    }
}
