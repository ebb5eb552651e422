//! ExperimentArmStore port - bandit arm statistics per experiment.

use async_trait::async_trait;

use crate::domain::experiment::ArmStats;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait ExperimentArmStore: Send + Sync {
    async fn list_experiments(&self) -> Result<Vec<String>, DomainError>;

    async fn load(&self, experiment: &str) -> Result<Vec<ArmStats>, DomainError>;

    /// Replaces the experiment's arms.
    async fn save(&self, experiment: &str, arms: &[ArmStats]) -> Result<(), DomainError>;
}
