//! LtvRecomputeHandler - lifetime value snapshot for one user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::jobs::{Task, TaskError};
use crate::ports::{cache_keys as keys, SnapshotCache, TaskHandler, TransactionRepository};

/// Snapshots outlive the nightly recompute by a wide margin.
const LTV_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug, Deserialize)]
struct LtvPayload {
    user_id: String,
}

pub struct LtvRecomputeHandler {
    transactions: Arc<dyn TransactionRepository>,
    cache: Arc<dyn SnapshotCache>,
}

impl LtvRecomputeHandler {
    pub fn new(transactions: Arc<dyn TransactionRepository>, cache: Arc<dyn SnapshotCache>) -> Self {
        Self {
            transactions,
            cache,
        }
    }
}

#[async_trait]
impl TaskHandler for LtvRecomputeHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: LtvPayload = task
            .payload_as()
            .map_err(|e| TaskError::unrecoverable(format!("invalid ltv payload: {}", e)))?;
        let user_id = UserId::new(payload.user_id)
            .map_err(|e| TaskError::unrecoverable(e.to_string()))?;

        let ltv_cents = self.transactions.total_for_user(&user_id).await?;
        let snapshot = json!({
            "user_id": user_id.as_str(),
            "ltv_cents": ltv_cents,
            "computed_at": Timestamp::now(),
        });
        self.cache
            .put(&keys::ltv(&user_id), &snapshot, LTV_SNAPSHOT_TTL)
            .await?;

        tracing::debug!(user_id = %user_id, ltv_cents, "LTV recomputed");
        Ok(())
    }
}
