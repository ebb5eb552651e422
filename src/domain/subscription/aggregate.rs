//! Subscription aggregate entity.
//!
//! # Design Decisions
//!
//! - **One current per user**: a partial unique index on `(user_id) WHERE status IN
//!   ('active', 'grace') AND deleted_at IS NULL` backs the invariant at the database level
//! - **Optimistic concurrency**: `version` is compared on every update; a stale writer
//!   gets `ConcurrencyConflict` and must re-read
//! - **Forward-only expiry**: `expires_at` never moves backwards on renewal
//! - **Idempotent terminal transitions**: cancelling a cancelled subscription is a no-op

use crate::domain::foundation::{
    DomainError, ErrorCode, StateMachine, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{Platform, PlanType, SubscriptionStatus};

/// Fields needed to open a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub source: Platform,
    pub product_id: String,
    pub provider_subscription_id: Option<String>,
    pub expires_at: Timestamp,
    pub auto_renew: bool,
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - Status transitions follow `SubscriptionStatus` rules
/// - `auto_renew` is false once cancelled
/// - `version` increases by one on every persisted change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    pub plan_type: PlanType,
    pub source: Platform,

    /// Store product identifier (e.g. `premium_monthly`).
    pub product_id: String,

    /// Provider's identifier for the recurring purchase: Stripe subscription id,
    /// Apple original transaction id, or Google purchase token.
    pub provider_subscription_id: Option<String>,

    pub expires_at: Timestamp,
    pub auto_renew: bool,

    /// Optimistic-lock version.
    pub version: i32,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
}

impl Subscription {
    /// Creates a new active subscription.
    pub fn activate(new: NewSubscription, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id: new.user_id,
            status: SubscriptionStatus::Active,
            plan_type: new.plan_type,
            source: new.source,
            product_id: new.product_id,
            provider_subscription_id: new.provider_subscription_id,
            expires_at: new.expires_at,
            auto_renew: new.auto_renew,
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            deleted_at: None,
        }
    }

    /// Returns true if the subscription currently grants access.
    ///
    /// Grace keeps access regardless of `expires_at`; the grace period bounds it.
    pub fn has_access(&self, now: Timestamp) -> bool {
        if self.deleted_at.is_some() {
            return false;
        }
        match self.status {
            SubscriptionStatus::Active => now.is_before(&self.expires_at),
            SubscriptionStatus::Grace => true,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => false,
        }
    }

    /// Extends the paid period after a successful charge or receipt.
    ///
    /// `expires_at` only moves forward. Returns true if anything changed.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the subscription is terminal.
    pub fn renew(&mut self, expires_at: Timestamp, now: Timestamp) -> Result<bool, DomainError> {
        self.transition(SubscriptionStatus::Active)?;
        if expires_at.is_after(&self.expires_at) {
            self.expires_at = expires_at;
            self.updated_at = now;
            return Ok(true);
        }
        Ok(false)
    }

    /// Moves an active subscription into grace after a renewal failure.
    ///
    /// Already in grace is a no-op.
    pub fn enter_grace(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        if self.status == SubscriptionStatus::Grace {
            return Ok(false);
        }
        self.transition(SubscriptionStatus::Grace)?;
        self.updated_at = now;
        Ok(true)
    }

    /// Returns a subscription in grace to active once payment recovers.
    pub fn resolve_grace(
        &mut self,
        new_expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        if self.status == SubscriptionStatus::Active {
            return Ok(false);
        }
        self.transition(SubscriptionStatus::Active)?;
        if let Some(expires_at) = new_expires_at {
            if expires_at.is_after(&self.expires_at) {
                self.expires_at = expires_at;
            }
        }
        self.updated_at = now;
        Ok(true)
    }

    /// Cancels the subscription. Terminal; forces `auto_renew` off.
    ///
    /// Cancelling a subscription that is already terminal is a no-op and
    /// returns `Ok(false)`.
    pub fn cancel(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        self.transition(SubscriptionStatus::Cancelled)?;
        self.auto_renew = false;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(true)
    }

    /// Marks the subscription expired (store reported expiry or revocation).
    ///
    /// Already terminal is a no-op.
    pub fn expire(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        self.transition(SubscriptionStatus::Expired)?;
        self.auto_renew = false;
        self.updated_at = now;
        Ok(true)
    }

    /// Records the store-side auto-renew preference.
    pub fn set_auto_renew(&mut self, auto_renew: bool, now: Timestamp) -> bool {
        if self.status.is_terminal() || self.auto_renew == auto_renew {
            return false;
        }
        self.auto_renew = auto_renew;
        self.updated_at = now;
        true
    }

    /// Days remaining in the paid period, zero once passed.
    pub fn days_remaining(&self, now: Timestamp) -> i64 {
        self.expires_at.duration_since(&now).num_days().max(0)
    }

    fn transition(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {} to {}",
                    self.status, target
                ),
            )
            .with_detail("subscription_id", self.id.to_string())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    fn active() -> Subscription {
        Subscription::activate(
            NewSubscription {
                user_id: UserId::new("user-1").unwrap(),
                plan_type: PlanType::Monthly,
                source: Platform::Ios,
                product_id: "premium_monthly".to_string(),
                provider_subscription_id: Some("1000000123".to_string()),
                expires_at: now().add_days(30),
                auto_renew: true,
            },
            now(),
        )
    }

    #[test]
    fn activate_starts_active_with_version_one() {
        let sub = active();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.version, 1);
        assert!(sub.has_access(now()));
    }

    #[test]
    fn renew_moves_expiry_forward() {
        let mut sub = active();
        let later = now().add_days(60);
        assert!(sub.renew(later, now()).unwrap());
        assert_eq!(sub.expires_at, later);
    }

    #[test]
    fn renew_never_moves_expiry_backwards() {
        let mut sub = active();
        let before = sub.expires_at;
        assert!(!sub.renew(now().add_days(5), now()).unwrap());
        assert_eq!(sub.expires_at, before);
    }

    #[test]
    fn renew_fails_when_cancelled() {
        let mut sub = active();
        sub.cancel(now()).unwrap();
        let err = sub.renew(now().add_days(60), now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn grace_round_trip() {
        let mut sub = active();
        assert!(sub.enter_grace(now()).unwrap());
        assert!(!sub.enter_grace(now()).unwrap());
        assert_eq!(sub.status, SubscriptionStatus::Grace);
        assert!(sub.has_access(now()));

        assert!(sub.resolve_grace(Some(now().add_days(45)), now()).unwrap());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, now().add_days(45));
    }

    #[test]
    fn cancel_forces_auto_renew_off_and_is_idempotent() {
        let mut sub = active();
        assert!(sub.cancel(now()).unwrap());
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(!sub.auto_renew);
        assert!(sub.cancelled_at.is_some());

        assert!(!sub.cancel(now()).unwrap());
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn cancel_from_grace_succeeds() {
        let mut sub = active();
        sub.enter_grace(now()).unwrap();
        assert!(sub.cancel(now()).unwrap());
        assert!(!sub.has_access(now()));
    }

    #[test]
    fn expire_is_noop_when_already_cancelled() {
        let mut sub = active();
        sub.cancel(now()).unwrap();
        assert!(!sub.expire(now()).unwrap());
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn enter_grace_fails_when_expired() {
        let mut sub = active();
        sub.expire(now()).unwrap();
        assert!(sub.enter_grace(now()).is_err());
    }

    #[test]
    fn set_auto_renew_reports_change() {
        let mut sub = active();
        assert!(sub.set_auto_renew(false, now()));
        assert!(!sub.set_auto_renew(false, now()));
    }

    #[test]
    fn days_remaining_clamps_at_zero() {
        let sub = active();
        assert_eq!(sub.days_remaining(now()), 30);
        assert_eq!(sub.days_remaining(now().add_days(40)), 0);
    }
}
