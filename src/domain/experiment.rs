//! Experiment arm statistics for the paywall bandit.
//!
//! Each arm keeps decayed pull and reward counts. Maintenance multiplies both
//! by a decay factor so old observations fade, and drops arms nobody has
//! pulled for a while.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub arm_id: String,
    pub pulls: f64,
    pub rewards: f64,
    pub last_pulled_at: Timestamp,
}

impl ArmStats {
    pub fn new(arm_id: impl Into<String>, now: Timestamp) -> Self {
        Self {
            arm_id: arm_id.into(),
            pulls: 0.0,
            rewards: 0.0,
            last_pulled_at: now,
        }
    }

    /// Observed reward rate, zero before the first pull.
    pub fn mean_reward(&self) -> f64 {
        if self.pulls <= 0.0 {
            0.0
        } else {
            self.rewards / self.pulls
        }
    }

    pub fn record(&mut self, rewarded: bool, now: Timestamp) {
        self.pulls += 1.0;
        if rewarded {
            self.rewards += 1.0;
        }
        self.last_pulled_at = now;
    }
}

/// Tuning for arm maintenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmMaintenance {
    /// Multiplier in (0, 1] applied to pulls and rewards on each run.
    pub decay: f64,
    /// Arms idle for longer than this are removed.
    pub idle_days: i64,
}

impl Default for ArmMaintenance {
    fn default() -> Self {
        Self {
            decay: 0.95,
            idle_days: 30,
        }
    }
}

/// Counts from one maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub decayed: usize,
    pub pruned: usize,
}

impl ArmMaintenance {
    /// Decays every arm and prunes idle ones. Rewards never exceed pulls.
    pub fn apply(&self, arms: &mut Vec<ArmStats>, now: Timestamp) -> MaintenanceReport {
        let cutoff = now.minus_days(self.idle_days);
        let before = arms.len();
        arms.retain(|arm| !arm.last_pulled_at.is_before(&cutoff));
        let pruned = before - arms.len();

        let decay = self.decay.clamp(0.0, 1.0);
        for arm in arms.iter_mut() {
            arm.pulls *= decay;
            arm.rewards = (arm.rewards * decay).min(arm.pulls);
        }
        MaintenanceReport {
            decayed: arms.len(),
            pruned,
        }
    }
}
