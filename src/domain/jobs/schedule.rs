//! Recurring schedules.
//!
//! Accepted forms:
//! - `@every 30s`, `@every 5m`, `@every 1h`, `@every 1d` (aligned to the epoch)
//! - `@hourly`, `@daily`
//! - five-field cron restricted to minute and hour: `M H * * *`, where each of
//!   `M` and `H` is `*`, a number, or `*/N`.
//!
//! Times are UTC.

use chrono::Timelike;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

use super::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    At(u32),
    Step(u32),
}

impl Field {
    fn parse(raw: &str, max: u32) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::invalid_format("schedule", format!("bad field '{}'", raw));
        if raw == "*" {
            return Ok(Field::Any);
        }
        if let Some(step) = raw.strip_prefix("*/") {
            let n: u32 = step.parse().map_err(|_| invalid())?;
            if n == 0 || n > max {
                return Err(invalid());
            }
            return Ok(Field::Step(n));
        }
        let n: u32 = raw.parse().map_err(|_| invalid())?;
        if n > max {
            return Err(invalid());
        }
        Ok(Field::At(n))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::At(n) => value == *n,
            Field::Step(n) => value % n == 0,
        }
    }
}

/// When a recurring task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    raw: String,
    kind: Kind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Every(u64),
    Cron { minute: Field, hour: Field },
}

impl ScheduleSpec {
    /// Fixed interval in seconds.
    pub fn every_secs(secs: u64) -> Result<Self, ValidationError> {
        if secs == 0 {
            return Err(ValidationError::out_of_range("interval", 1, i64::MAX, 0));
        }
        Ok(Self {
            raw: format!("@every {}s", secs),
            kind: Kind::Every(secs),
        })
    }

    /// First fire strictly after `now`.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        let secs = now.as_unix_secs();
        match self.kind {
            Kind::Every(interval) => Timestamp::from_unix_secs((secs / interval + 1) * interval),
            Kind::Cron { minute, hour } => {
                let mut candidate = (secs / 60 + 1) * 60;
                // Any minute/hour pattern repeats within a day.
                for _ in 0..(24 * 60) {
                    let at = Timestamp::from_unix_secs(candidate);
                    let dt = at.as_datetime();
                    if minute.matches(dt.minute()) && hour.matches(dt.hour()) {
                        return at;
                    }
                    candidate += 60;
                }
                Timestamp::from_unix_secs(candidate)
            }
        }
    }

    /// Key for one firing, shared by every process that fires the same slot.
    pub fn slot_key(task_type: TaskType, slot: Timestamp) -> String {
        format!("{}:{}", task_type.as_str(), slot.as_unix_secs())
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ScheduleSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = |reason: &str| ValidationError::invalid_format("schedule", reason.to_string());

        let kind = match raw {
            "@hourly" => Kind::Cron {
                minute: Field::At(0),
                hour: Field::Any,
            },
            "@daily" => Kind::Cron {
                minute: Field::At(0),
                hour: Field::At(0),
            },
            _ if raw.starts_with("@every ") => {
                let value = raw["@every ".len()..].trim();
                let split = value
                    .char_indices()
                    .last()
                    .map(|(i, _)| i)
                    .filter(|i| *i > 0)
                    .ok_or_else(|| invalid("missing interval"))?;
                let (digits, unit) = value.split_at(split);
                let n: u64 = digits.parse().map_err(|_| invalid("bad interval"))?;
                let scale = match unit {
                    "s" => 1,
                    "m" => 60,
                    "h" => 3_600,
                    "d" => 86_400,
                    _ => return Err(invalid("unit must be s, m, h or d")),
                };
                if n == 0 {
                    return Err(invalid("interval must be positive"));
                }
                Kind::Every(n * scale)
            }
            _ => {
                let fields: Vec<&str> = raw.split_whitespace().collect();
                if fields.len() != 5 {
                    return Err(invalid("expected five cron fields"));
                }
                if fields[2..].iter().any(|f| *f != "*") {
                    return Err(invalid("day, month and weekday fields must be '*'"));
                }
                Kind::Cron {
                    minute: Field::parse(fields[0], 59)?,
                    hour: Field::parse(fields[1], 23)?,
                }
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01T00:00:00Z
    const MIDNIGHT: u64 = 1_704_067_200;

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_unix_secs(secs)
    }

    #[test]
    fn every_aligns_to_interval() {
        let spec: ScheduleSpec = "@every 5m".parse().unwrap();
        assert_eq!(spec.next_after(at(MIDNIGHT)), at(MIDNIGHT + 300));
        assert_eq!(spec.next_after(at(MIDNIGHT + 1)), at(MIDNIGHT + 300));
        assert_eq!(spec.next_after(at(MIDNIGHT + 299)), at(MIDNIGHT + 300));
    }

    #[test]
    fn next_after_is_strictly_later() {
        for spec in ["@every 30s", "@hourly", "@daily", "*/15 * * * *", "30 2 * * *"] {
            let spec: ScheduleSpec = spec.parse().unwrap();
            let now = at(MIDNIGHT + 3_600);
            assert!(spec.next_after(now).is_after(&now), "{}", spec);
        }
    }

    #[test]
    fn daily_fires_at_midnight() {
        let spec: ScheduleSpec = "@daily".parse().unwrap();
        assert_eq!(spec.next_after(at(MIDNIGHT + 10)), at(MIDNIGHT + 86_400));
    }

    #[test]
    fn cron_fixed_time() {
        let spec: ScheduleSpec = "30 2 * * *".parse().unwrap();
        assert_eq!(spec.next_after(at(MIDNIGHT)), at(MIDNIGHT + 2 * 3_600 + 30 * 60));
    }

    #[test]
    fn cron_step_minutes() {
        let spec: ScheduleSpec = "*/15 * * * *".parse().unwrap();
        assert_eq!(spec.next_after(at(MIDNIGHT + 60)), at(MIDNIGHT + 900));
    }

    #[test]
    fn rejects_unsupported_forms() {
        for bad in ["", "@weekly", "@every", "@every 5x", "@every 0s", "0 0 1 * *", "61 * * * *", "*/0 * * * *"] {
            assert!(bad.parse::<ScheduleSpec>().is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn slot_key_names_type_and_time() {
        assert_eq!(
            ScheduleSpec::slot_key(TaskType::GraceExpirySweep, at(MIDNIGHT)),
            format!("grace_expiry_sweep:{}", MIDNIGHT)
        );
    }
}
