//! Job scheduler configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::jobs::{QueueClass, QueueWeights, ScheduleSpec, TaskType};

use super::error::ValidationError;

/// Schedule value that turns a recurring task off.
pub const DISABLED: &str = "off";

/// Worker pool and recurring task configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Run the worker pool in this process
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Concurrent task executions
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Idle poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-task execution timeout in seconds; also the lease length
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Attempts before a task is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    #[serde(default = "default_critical_weight")]
    pub weight_critical: u32,

    #[serde(default = "default_default_weight")]
    pub weight_default: u32,

    #[serde(default = "default_low_weight")]
    pub weight_low: u32,

    /// Interval of the stale-lease reaper in seconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// Time allowed for running tasks to finish on shutdown
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Recurring schedules; `off` disables one.
    #[serde(default)]
    pub recurring: RecurringSchedules,
}

/// Schedule strings for the recurring task types.
#[derive(Debug, Clone, Deserialize)]
pub struct RecurringSchedules {
    #[serde(default = "default_webhook_sweep")]
    pub webhook_sweep: String,

    #[serde(default = "default_grace_expiry_sweep")]
    pub grace_expiry_sweep: String,

    #[serde(default = "default_winback_expiry_sweep")]
    pub winback_expiry_sweep: String,

    #[serde(default = "default_daily_analytics")]
    pub daily_analytics: String,

    #[serde(default = "default_currency_refresh")]
    pub currency_refresh: String,

    #[serde(default = "default_arm_maintenance")]
    pub experiment_arm_maintenance: String,
}

/// One parsed recurring entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringTask {
    pub task_type: TaskType,
    pub queue: QueueClass,
    pub schedule: ScheduleSpec,
}

impl RecurringSchedules {
    fn entries(&self) -> [(TaskType, QueueClass, &'static str, &str); 6] {
        [
            (TaskType::WebhookSweep, QueueClass::Critical, "webhook_sweep", self.webhook_sweep.as_str()),
            (
                TaskType::GraceExpirySweep,
                QueueClass::Critical,
                "grace_expiry_sweep",
                self.grace_expiry_sweep.as_str(),
            ),
            (
                TaskType::WinbackExpirySweep,
                QueueClass::Default,
                "winback_expiry_sweep",
                self.winback_expiry_sweep.as_str(),
            ),
            (TaskType::DailyAnalytics, QueueClass::Low, "daily_analytics", self.daily_analytics.as_str()),
            (TaskType::CurrencyRefresh, QueueClass::Low, "currency_refresh", self.currency_refresh.as_str()),
            (
                TaskType::ExperimentArmMaintenance,
                QueueClass::Low,
                "experiment_arm_maintenance",
                self.experiment_arm_maintenance.as_str(),
            ),
        ]
    }

    /// Parses every enabled schedule.
    pub fn parse(&self) -> Result<Vec<RecurringTask>, ValidationError> {
        let mut tasks = Vec::new();
        for (task_type, queue, name, raw) in self.entries() {
            if raw.trim().eq_ignore_ascii_case(DISABLED) {
                continue;
            }
            let schedule = raw
                .parse::<ScheduleSpec>()
                .map_err(|e| ValidationError::InvalidSchedule(name, e.to_string()))?;
            tasks.push(RecurringTask {
                task_type,
                queue,
                schedule,
            });
        }
        Ok(tasks)
    }
}

impl Default for RecurringSchedules {
    fn default() -> Self {
        Self {
            webhook_sweep: default_webhook_sweep(),
            grace_expiry_sweep: default_grace_expiry_sweep(),
            winback_expiry_sweep: default_winback_expiry_sweep(),
            daily_analytics: default_daily_analytics(),
            currency_refresh: default_currency_refresh(),
            experiment_arm_maintenance: default_arm_maintenance(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn weights(&self) -> QueueWeights {
        QueueWeights {
            critical: self.weight_critical,
            default: self.weight_default,
            low: self.weight_low,
        }
    }

    /// Validate scheduler configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 || self.workers > 256 {
            return Err(ValidationError::InvalidScheduler("workers must be 1..=256"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidScheduler("poll_interval_ms must be positive"));
        }
        if self.task_timeout_secs == 0 {
            return Err(ValidationError::InvalidScheduler("task_timeout_secs must be positive"));
        }
        if self.max_attempts < 1 {
            return Err(ValidationError::InvalidScheduler("max_attempts must be at least 1"));
        }
        if self.weights().total() == 0 {
            return Err(ValidationError::InvalidScheduler("queue weights must not all be zero"));
        }
        if self.reaper_interval_secs == 0 {
            return Err(ValidationError::InvalidScheduler("reaper_interval_secs must be positive"));
        }
        self.recurring.parse()?;
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            task_timeout_secs: default_task_timeout(),
            max_attempts: default_max_attempts(),
            weight_critical: default_critical_weight(),
            weight_default: default_default_weight(),
            weight_low: default_low_weight(),
            reaper_interval_secs: default_reaper_interval(),
            drain_timeout_secs: default_drain_timeout(),
            recurring: RecurringSchedules::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    500
}

fn default_task_timeout() -> u64 {
    60
}

fn default_max_attempts() -> i32 {
    5
}

fn default_critical_weight() -> u32 {
    6
}

fn default_default_weight() -> u32 {
    3
}

fn default_low_weight() -> u32 {
    1
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_webhook_sweep() -> String {
    "@every 60s".to_string()
}

fn default_grace_expiry_sweep() -> String {
    "@every 5m".to_string()
}

fn default_winback_expiry_sweep() -> String {
    "@hourly".to_string()
}

fn default_daily_analytics() -> String {
    "15 0 * * *".to_string()
}

fn default_currency_refresh() -> String {
    "@every 6h".to_string()
}

fn default_arm_maintenance() -> String {
    "@daily".to_string()
}
