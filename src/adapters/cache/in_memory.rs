//! In-memory snapshot cache and arm store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::experiment::ArmStats;
use crate::domain::foundation::DomainError;
use crate::ports::{ExperimentArmStore, SnapshotCache};

#[derive(Debug, Default)]
pub struct InMemorySnapshotCache {
    entries: RwLock<HashMap<String, (serde_json::Value, Instant)>>,
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryArmStore {
    experiments: RwLock<BTreeMap<String, Vec<ArmStats>>>,
}

impl InMemoryArmStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentArmStore for InMemoryArmStore {
    async fn list_experiments(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.experiments.read().await.keys().cloned().collect())
    }

    async fn load(&self, experiment: &str) -> Result<Vec<ArmStats>, DomainError> {
        Ok(self
            .experiments
            .read()
            .await
            .get(experiment)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, experiment: &str, arms: &[ArmStats]) -> Result<(), DomainError> {
        self.experiments
            .write()
            .await
            .insert(experiment.to_string(), arms.to_vec());
        Ok(())
    }
}
