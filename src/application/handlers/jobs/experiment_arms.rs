//! ExperimentArmMaintenanceHandler - decays bandit arm statistics and prunes
//! arms nobody has pulled recently.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::experiment::{ArmMaintenance, MaintenanceReport};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{Task, TaskError};
use crate::ports::{ExperimentArmStore, TaskHandler};

pub struct ExperimentArmMaintenanceHandler {
    arms: Arc<dyn ExperimentArmStore>,
    policy: ArmMaintenance,
}

impl ExperimentArmMaintenanceHandler {
    pub fn new(arms: Arc<dyn ExperimentArmStore>, policy: ArmMaintenance) -> Self {
        Self { arms, policy }
    }

    pub async fn run(&self, now: Timestamp) -> Result<MaintenanceReport, DomainError> {
        let mut total = MaintenanceReport::default();
        for experiment in self.arms.list_experiments().await? {
            let mut arms = self.arms.load(&experiment).await?;
            let report = self.policy.apply(&mut arms, now);
            self.arms.save(&experiment, &arms).await?;
            tracing::debug!(
                experiment = %experiment,
                decayed = report.decayed,
                pruned = report.pruned,
                "Experiment arms maintained"
            );
            total.decayed += report.decayed;
            total.pruned += report.pruned;
        }
        Ok(total)
    }
}

#[async_trait]
impl TaskHandler for ExperimentArmMaintenanceHandler {
    async fn handle(&self, _task: &Task) -> Result<(), TaskError> {
        self.run(Timestamp::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::InMemoryArmStore;
    use crate::domain::experiment::ArmStats;

    #[tokio::test]
    async fn decays_and_prunes_every_experiment() {
        let now = Timestamp::from_unix_secs(1_700_000_000);
        let store = Arc::new(InMemoryArmStore::new());
        let mut fresh = ArmStats::new("annual_first", now);
        for i in 0..10 {
            fresh.record(i % 2 == 0, now);
        }
        let idle = ArmStats::new("legacy", now.minus_days(60));
        store.save("paywall", &[fresh, idle]).await.unwrap();
        store
            .save("onboarding", &[ArmStats::new("short", now)])
            .await
            .unwrap();

        let handler = ExperimentArmMaintenanceHandler::new(
            store.clone(),
            ArmMaintenance {
                decay: 0.5,
                idle_days: 30,
            },
        );
        let report = handler.run(now).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(report.decayed, 2);
        let paywall = store.load("paywall").await.unwrap();
        assert_eq!(paywall.len(), 1);
        assert_eq!(paywall[0].pulls, 5.0);
        assert!(paywall[0].rewards <= paywall[0].pulls);
    }
}
