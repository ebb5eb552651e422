//! CurrencyRefreshHandler - pulls FX rates into the snapshot cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;

use crate::domain::jobs::{Task, TaskError};
use crate::ports::{cache_keys as keys, CurrencyRateSource, SnapshotCache, TaskHandler};

/// Rates go stale after a day; the refresh runs hourly.
const FX_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 3600);

const MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Default, Deserialize)]
struct CurrencyPayload {
    #[serde(default)]
    bases: Option<Vec<String>>,
}

pub struct CurrencyRefreshHandler {
    source: Arc<dyn CurrencyRateSource>,
    cache: Arc<dyn SnapshotCache>,
    default_bases: Vec<String>,
}

impl CurrencyRefreshHandler {
    pub fn new(
        source: Arc<dyn CurrencyRateSource>,
        cache: Arc<dyn SnapshotCache>,
        default_bases: Vec<String>,
    ) -> Self {
        Self {
            source,
            cache,
            default_bases,
        }
    }

    async fn refresh_base(&self, base: &str) -> Result<(), String> {
        let rates = self.source.fetch(base).await.map_err(|e| e.to_string())?;
        let value = serde_json::to_value(&rates).map_err(|e| e.to_string())?;
        self.cache
            .put(&keys::fx(base), &value, FX_SNAPSHOT_TTL)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TaskHandler for CurrencyRefreshHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: CurrencyPayload = if task.payload.is_null() {
            CurrencyPayload::default()
        } else {
            task.payload_as()
                .map_err(|e| TaskError::unrecoverable(format!("invalid currency payload: {}", e)))?
        };
        let bases = payload.bases.unwrap_or_else(|| self.default_bases.clone());

        // Bases are independent; one upstream failure must not block the rest.
        let failed: Vec<String> = stream::iter(bases)
            .map(|base| async move {
                match self.refresh_base(&base).await {
                    Ok(()) => {
                        tracing::debug!(base = %base, "FX rates refreshed");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(base = %base, error = %e, "FX refresh failed");
                        Some(format!("{}: {}", base, e))
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .filter_map(|failure| async move { failure })
            .collect()
            .await;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TaskError::recoverable(format!(
                "fx refresh failed for {}",
                failed.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::InMemorySnapshotCache;
    use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
    use crate::domain::jobs::{NewTask, TaskType};
    use crate::ports::CurrencyRates;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct FixedRates;

    #[async_trait]
    impl CurrencyRateSource for FixedRates {
        async fn fetch(&self, base: &str) -> Result<CurrencyRates, DomainError> {
            if base == "JPY" {
                return Err(DomainError::new(ErrorCode::ExternalUnavailable, "upstream down"));
            }
            Ok(CurrencyRates {
                base: base.to_string(),
                rates: BTreeMap::from([("EUR".to_string(), 0.9)]),
                fetched_at: Timestamp::from_unix_secs(1_700_000_000),
            })
        }
    }

    fn task(payload: serde_json::Value) -> Task {
        Task::from_new(
            NewTask::new(TaskType::CurrencyRefresh, payload),
            5,
            Timestamp::from_unix_secs(1_700_000_000),
        )
    }

    #[tokio::test]
    async fn caches_configured_bases() {
        let cache = Arc::new(InMemorySnapshotCache::new());
        let handler =
            CurrencyRefreshHandler::new(Arc::new(FixedRates), cache.clone(), vec!["USD".to_string()]);

        handler.handle(&task(serde_json::Value::Null)).await.unwrap();

        let cached = cache.get("fx:USD").await.unwrap().unwrap();
        assert_eq!(cached["rates"]["EUR"], 0.9);
    }

    #[tokio::test]
    async fn upstream_failure_is_retried_but_others_are_kept() {
        let cache = Arc::new(InMemorySnapshotCache::new());
        let handler = CurrencyRefreshHandler::new(Arc::new(FixedRates), cache.clone(), vec![]);

        let err = handler
            .handle(&task(json!({"bases": ["USD", "JPY"]})))
            .await
            .unwrap_err();

        assert!(err.is_recoverable());
        assert!(cache.get("fx:USD").await.unwrap().is_some());
        assert!(cache.get("fx:JPY").await.unwrap().is_none());
    }
}
