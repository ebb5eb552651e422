//! Dunning: the retry ladder for a failed recurring payment.

use crate::domain::foundation::{
    DomainError, DunningId, ErrorCode, StateMachine, SubscriptionId, Timestamp, UserId,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attempts before a dunning record gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay in days before retry number `attempt` (zero-based).
/// The last entry applies to every later attempt.
const LADDER_DAYS: [i64; 5] = [1, 3, 7, 14, 30];

/// Delay before retry number `attempt` (zero-based).
///
/// Attempts 0-4 wait 24h, 72h, 168h, 336h and 720h; every later attempt
/// waits 720h.
pub fn retry_delay(attempt: u32) -> Duration {
    let idx = (attempt as usize).min(LADDER_DAYS.len() - 1);
    Duration::days(LADDER_DAYS[idx])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningStatus {
    /// Opened, first retry not yet attempted.
    Pending,
    /// At least one retry failed, more remain.
    InProgress,
    Recovered,
    Failed,
}

impl DunningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DunningStatus::Pending => "pending",
            DunningStatus::InProgress => "in_progress",
            DunningStatus::Recovered => "recovered",
            DunningStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DunningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DunningStatus::Pending),
            "in_progress" => Ok(DunningStatus::InProgress),
            "recovered" => Ok(DunningStatus::Recovered),
            "failed" => Ok(DunningStatus::Failed),
            other => Err(format!("unknown dunning status: {}", other)),
        }
    }
}

impl StateMachine for DunningStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use DunningStatus::*;
        matches!(
            (self, target),
            (Pending, InProgress)
                | (Pending, Recovered)
                | (Pending, Failed)
                | (InProgress, InProgress)
                | (InProgress, Recovered)
                | (InProgress, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use DunningStatus::*;
        match self {
            Pending => vec![InProgress, Recovered, Failed],
            InProgress => vec![InProgress, Recovered, Failed],
            Recovered | Failed => vec![],
        }
    }
}

/// Dunning record for one subscription.
///
/// # Invariants
///
/// - `attempt_count` never decreases
/// - `recovered` and `failed` are terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dunning {
    pub id: DunningId,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<Timestamp>,
    pub status: DunningStatus,
    pub last_failure_reason: Option<String>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Dunning {
    /// Opens dunning after the first failed charge; first retry in 24h.
    pub fn open(
        subscription_id: SubscriptionId,
        user_id: UserId,
        max_attempts: u32,
        now: Timestamp,
    ) -> Self {
        Self {
            id: DunningId::new(),
            subscription_id,
            user_id,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            next_attempt_at: Some(now.plus(retry_delay(0))),
            status: DunningStatus::Pending,
            last_failure_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if a retry is scheduled at or before `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.is_terminal()
            && self
                .next_attempt_at
                .map(|at| !now.is_before(&at))
                .unwrap_or(false)
    }

    /// Records another failed charge and schedules the next rung.
    ///
    /// After `max_attempts` failures the record moves to `failed`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if already terminal.
    pub fn record_failure(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<DunningStatus, DomainError> {
        if self.is_terminal() {
            return Err(self.terminal_error("record a failure on"));
        }
        self.attempt_count += 1;
        self.last_failure_reason = Some(reason.into());
        self.updated_at = now;

        if self.attempt_count >= self.max_attempts {
            self.status = self.status.transition_to(DunningStatus::Failed)?;
            self.next_attempt_at = None;
        } else {
            self.status = self.status.transition_to(DunningStatus::InProgress)?;
            self.next_attempt_at = Some(now.plus(retry_delay(self.attempt_count)));
        }
        Ok(self.status)
    }

    /// Marks the payment recovered.
    ///
    /// Recovering twice is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if dunning already failed.
    pub fn recover(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        match self.status {
            DunningStatus::Recovered => Ok(false),
            DunningStatus::Failed => Err(self.terminal_error("recover")),
            DunningStatus::Pending | DunningStatus::InProgress => {
                self.status = self.status.transition_to(DunningStatus::Recovered)?;
                self.next_attempt_at = None;
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    fn terminal_error(&self, action: &str) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!("cannot {} {} dunning", action, self.status),
        )
        .with_detail("dunning_id", self.id.to_string())
    }
}
