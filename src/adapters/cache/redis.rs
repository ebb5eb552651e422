//! Redis snapshot cache and arm store. Values are JSON strings.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::experiment::ArmStats;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{cache_keys, ExperimentArmStore, SnapshotCache};

use super::EXPERIMENTS_KEY;

fn cache_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("Cache operation failed: {}", e))
}

fn decode_error(e: serde_json::Error) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("Corrupt cache entry: {}", e))
}

#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: MultiplexedConnection,
}

impl RedisSnapshotCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value.to_string())
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DomainError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(cache_error)?;
        raw.map(|s| serde_json::from_str(&s).map_err(decode_error))
            .transpose()
    }
}

#[derive(Clone)]
pub struct RedisArmStore {
    conn: MultiplexedConnection,
}

impl RedisArmStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ExperimentArmStore for RedisArmStore {
    async fn list_experiments(&self) -> Result<Vec<String>, DomainError> {
        let mut conn = self.conn.clone();
        let mut names: Vec<String> = conn.smembers(EXPERIMENTS_KEY).await.map_err(cache_error)?;
        names.sort();
        Ok(names)
    }

    async fn load(&self, experiment: &str) -> Result<Vec<ArmStats>, DomainError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(cache_keys::bandit_arms(experiment))
            .await
            .map_err(cache_error)?;
        match raw {
            Some(s) => serde_json::from_str(&s).map_err(decode_error),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, experiment: &str, arms: &[ArmStats]) -> Result<(), DomainError> {
        let body = serde_json::to_string(arms).map_err(decode_error)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(cache_keys::bandit_arms(experiment), body)
            .ignore()
            .sadd(EXPERIMENTS_KEY, experiment)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)
    }
}
