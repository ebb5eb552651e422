//! Scheduled tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{TaskId, Timestamp, ValidationError};

/// Kinds of work the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Recompute one user's lifetime value.
    LtvRecompute,
    /// Aggregate subscription counts and revenue for one day.
    DailyAnalytics,
    /// Process unprocessed inbox events.
    WebhookSweep,
    /// Expire overdue grace periods and cancel their subscriptions.
    GraceExpirySweep,
    /// Close winback offers past their deadline.
    WinbackExpirySweep,
    NotificationSend,
    LedgerSync,
    CurrencyRefresh,
    ExperimentArmMaintenance,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::LtvRecompute,
        TaskType::DailyAnalytics,
        TaskType::WebhookSweep,
        TaskType::GraceExpirySweep,
        TaskType::WinbackExpirySweep,
        TaskType::NotificationSend,
        TaskType::LedgerSync,
        TaskType::CurrencyRefresh,
        TaskType::ExperimentArmMaintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::LtvRecompute => "ltv_recompute",
            TaskType::DailyAnalytics => "daily_analytics",
            TaskType::WebhookSweep => "webhook_sweep",
            TaskType::GraceExpirySweep => "grace_expiry_sweep",
            TaskType::WinbackExpirySweep => "winback_expiry_sweep",
            TaskType::NotificationSend => "notification_send",
            TaskType::LedgerSync => "ledger_sync",
            TaskType::CurrencyRefresh => "currency_refresh",
            TaskType::ExperimentArmMaintenance => "experiment_arm_maintenance",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::invalid_format("task_type", format!("unknown: {}", s)))
    }
}

/// Priority class. Served in proportion to configured weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    Critical,
    #[default]
    Default,
    Low,
}

impl QueueClass {
    pub const ALL: [QueueClass; 3] = [QueueClass::Critical, QueueClass::Default, QueueClass::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Critical => "critical",
            QueueClass::Default => "default",
            QueueClass::Low => "low",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            QueueClass::Critical => 0,
            QueueClass::Default => 1,
            QueueClass::Low => 2,
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(QueueClass::Critical),
            "default" => Ok(QueueClass::Default),
            "low" => Ok(QueueClass::Low),
            other => Err(ValidationError::invalid_format(
                "queue_class",
                format!("unknown: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for `run_at`.
    Pending,
    /// Claimed by a worker until `locked_until`.
    Running,
    Completed,
    /// Out of attempts or unrecoverable. Kept for inspection.
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "task_status",
                format!("unknown: {}", other),
            )),
        }
    }
}

/// A unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub queue: QueueClass,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    /// Executions started so far.
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: Timestamp,
    /// Lease expiry while running; the reaper returns the task after this.
    pub locked_until: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Unique when set; a second enqueue with the same key is a no-op.
    pub dedupe_key: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    pub fn from_new(new: NewTask, default_max_attempts: i32, now: Timestamp) -> Self {
        Self {
            id: TaskId::new(),
            task_type: new.task_type,
            queue: new.queue,
            payload: new.payload,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: new.max_attempts.unwrap_or(default_max_attempts).max(1),
            run_at: new.run_at.unwrap_or(now),
            locked_until: None,
            last_error: None,
            dedupe_key: new.dedupe_key,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_ready(&self, now: Timestamp) -> bool {
        self.status == TaskStatus::Pending && !now.is_before(&self.run_at)
    }

    /// True once no further attempt is allowed.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Retries already made (the first run is not a retry).
    pub fn retries(&self) -> i32 {
        (self.attempts - 1).max(0)
    }

    /// Deserializes the payload into a typed struct.
    pub fn payload_as<P: serde::de::DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builder for an enqueue request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub queue: QueueClass,
    pub run_at: Option<Timestamp>,
    pub max_attempts: Option<i32>,
    pub dedupe_key: Option<String>,
}

impl NewTask {
    pub fn new(task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            task_type,
            payload,
            queue: QueueClass::Default,
            run_at: None,
            max_attempts: None,
            dedupe_key: None,
        }
    }

    pub fn queue(mut self, queue: QueueClass) -> Self {
        self.queue = queue;
        self
    }

    pub fn run_at(mut self, at: Timestamp) -> Self {
        self.run_at = Some(at);
        self
    }

    pub fn max_attempts(mut self, n: i32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_type_round_trips_through_str() {
        for t in TaskType::ALL {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
        assert!("reindex".parse::<TaskType>().is_err());
    }

    #[test]
    fn queue_class_parses() {
        assert_eq!("critical".parse::<QueueClass>().unwrap(), QueueClass::Critical);
        assert!("urgent".parse::<QueueClass>().is_err());
    }

    #[test]
    fn from_new_applies_defaults() {
        let now = Timestamp::from_unix_secs(1_000);
        let task = Task::from_new(NewTask::new(TaskType::LedgerSync, json!({})), 5, now);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.queue, QueueClass::Default);
        assert_eq!(task.max_attempts, 5);
        assert_eq!(task.run_at, now);
        assert!(task.is_ready(now));
    }

    #[test]
    fn builder_overrides_defaults() {
        let now = Timestamp::from_unix_secs(1_000);
        let later = now.plus_secs(60);
        let task = Task::from_new(
            NewTask::new(TaskType::WebhookSweep, json!({}))
                .queue(QueueClass::Critical)
                .run_at(later)
                .max_attempts(2)
                .dedupe_key("webhook_sweep:1060"),
            5,
            now,
        );
        assert_eq!(task.queue, QueueClass::Critical);
        assert_eq!(task.max_attempts, 2);
        assert!(!task.is_ready(now));
        assert!(task.is_ready(later));
        assert_eq!(task.dedupe_key.as_deref(), Some("webhook_sweep:1060"));
    }

    #[test]
    fn retries_excludes_first_run() {
        let mut task = Task::from_new(
            NewTask::new(TaskType::LedgerSync, json!({})),
            3,
            Timestamp::now(),
        );
        assert_eq!(task.retries(), 0);
        task.attempts = 1;
        assert_eq!(task.retries(), 0);
        task.attempts = 3;
        assert_eq!(task.retries(), 2);
        assert!(task.attempts_exhausted());
    }

    #[test]
    fn payload_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct P {
            user_id: String,
        }
        let task = Task::from_new(
            NewTask::new(TaskType::LtvRecompute, json!({"user_id": "u1"})),
            3,
            Timestamp::now(),
        );
        assert_eq!(task.payload_as::<P>().unwrap().user_id, "u1");
    }
}
