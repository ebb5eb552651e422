//! Cache adapters for derived state: snapshots and experiment arms.

mod in_memory;
mod redis;

pub use in_memory::{InMemoryArmStore, InMemorySnapshotCache};
pub use redis::{RedisArmStore, RedisSnapshotCache};

/// Set holding every experiment name with stored arms.
pub(crate) const EXPERIMENTS_KEY: &str = "bandit:experiments";
