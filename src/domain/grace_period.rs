//! Grace period entity.
//!
//! A bounded window after a renewal failure during which access is preserved.
//! Both exits (`resolved`, `expired`) are one-way.

use crate::domain::foundation::{
    DomainError, ErrorCode, GracePeriodId, StateMachine, SubscriptionId, Timestamp, UserId,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shortest allowed grace period.
pub const MIN_GRACE_DAYS: i64 = 1;

/// Longest allowed grace period.
pub const MAX_GRACE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GracePeriodStatus {
    Active,
    Resolved,
    Expired,
}

impl GracePeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GracePeriodStatus::Active => "active",
            GracePeriodStatus::Resolved => "resolved",
            GracePeriodStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for GracePeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GracePeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(GracePeriodStatus::Active),
            "resolved" => Ok(GracePeriodStatus::Resolved),
            "expired" => Ok(GracePeriodStatus::Expired),
            other => Err(format!("unknown grace period status: {}", other)),
        }
    }
}

impl StateMachine for GracePeriodStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use GracePeriodStatus::*;
        matches!((self, target), (Active, Resolved) | (Active, Expired))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use GracePeriodStatus::*;
        match self {
            Active => vec![Resolved, Expired],
            Resolved | Expired => vec![],
        }
    }
}

/// Grace period for one subscription.
///
/// # Invariants
///
/// - At most one active grace period per subscription (unique partial index)
/// - `started_at < expires_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePeriod {
    pub id: GracePeriodId,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub status: GracePeriodStatus,
    pub started_at: Timestamp,
    pub expires_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub version: i32,
    pub updated_at: Timestamp,
}

impl GracePeriod {
    /// Opens a grace period lasting `duration_days`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` unless `1 <= duration_days <= 30`.
    pub fn start(
        user_id: UserId,
        subscription_id: SubscriptionId,
        duration_days: i64,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if !(MIN_GRACE_DAYS..=MAX_GRACE_DAYS).contains(&duration_days) {
            return Err(ValidationError::out_of_range(
                "duration_days",
                MIN_GRACE_DAYS,
                MAX_GRACE_DAYS,
                duration_days,
            ));
        }
        Ok(Self {
            id: GracePeriodId::new(),
            user_id,
            subscription_id,
            status: GracePeriodStatus::Active,
            started_at: now,
            expires_at: now.add_days(duration_days),
            resolved_at: None,
            version: 1,
            updated_at: now,
        })
    }

    /// True if still active and past its deadline.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status == GracePeriodStatus::Active && !now.is_before(&self.expires_at)
    }

    /// Resolves the grace period after payment recovered.
    ///
    /// Resolving twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the period already expired.
    pub fn resolve(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        match self.status {
            GracePeriodStatus::Resolved => Ok(false),
            GracePeriodStatus::Expired => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "cannot resolve expired grace period",
            )
            .with_detail("grace_period_id", self.id.to_string())),
            GracePeriodStatus::Active => {
                self.status = self.status.transition_to(GracePeriodStatus::Resolved)?;
                self.resolved_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    /// Expires the grace period.
    ///
    /// Expiring twice is a no-op, so the expiry sweep can re-run safely.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the period was already resolved.
    pub fn expire(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        match self.status {
            GracePeriodStatus::Expired => Ok(false),
            GracePeriodStatus::Resolved => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "cannot expire resolved grace period",
            )
            .with_detail("grace_period_id", self.id.to_string())),
            GracePeriodStatus::Active => {
                self.status = self.status.transition_to(GracePeriodStatus::Expired)?;
                self.updated_at = now;
                Ok(true)
            }
        }
    }
}
