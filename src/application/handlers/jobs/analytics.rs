//! DailyAnalyticsHandler - subscription counts and revenue for one day.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use crate::domain::foundation::Timestamp;
use crate::domain::jobs::{Task, TaskError};
use crate::ports::{
    cache_keys as keys, SnapshotCache, SubscriptionRepository, TaskHandler, TransactionRepository,
};

const ANALYTICS_SNAPSHOT_TTL: Duration = Duration::from_secs(90 * 24 * 3600);

#[derive(Debug, Default, Deserialize)]
struct AnalyticsPayload {
    /// Day to aggregate; yesterday (UTC) when absent.
    #[serde(default)]
    date: Option<NaiveDate>,
}

pub struct DailyAnalyticsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    transactions: Arc<dyn TransactionRepository>,
    cache: Arc<dyn SnapshotCache>,
}

impl DailyAnalyticsHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        transactions: Arc<dyn TransactionRepository>,
        cache: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self {
            subscriptions,
            transactions,
            cache,
        }
    }

    /// Aggregates `date` and stores it under `analytics:daily:{date}`.
    pub async fn aggregate(
        &self,
        date: NaiveDate,
        now: Timestamp,
    ) -> Result<serde_json::Value, TaskError> {
        let (from, to) = day_bounds(date)?;

        let counts: BTreeMap<String, i64> = self
            .subscriptions
            .count_by_status()
            .await?
            .into_iter()
            .map(|(status, n)| (status.as_str().to_string(), n))
            .collect();
        let revenue_cents = self.transactions.revenue_between(from, to).await?;

        let snapshot = json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "subscriptions_by_status": counts,
            "revenue_cents": revenue_cents,
            "computed_at": now,
        });
        self.cache
            .put(&keys::daily_analytics(date), &snapshot, ANALYTICS_SNAPSHOT_TTL)
            .await?;

        tracing::info!(date = %date, revenue_cents, "Daily analytics aggregated");
        Ok(snapshot)
    }
}

fn day_bounds(date: NaiveDate) -> Result<(Timestamp, Timestamp), TaskError> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| TaskError::unrecoverable("invalid date"))?
        .and_utc();
    let end = start
        .checked_add_days(Days::new(1))
        .ok_or_else(|| TaskError::unrecoverable("date out of range"))?;
    Ok((Timestamp::from_datetime(start), Timestamp::from_datetime(end)))
}

#[async_trait]
impl TaskHandler for DailyAnalyticsHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: AnalyticsPayload = if task.payload.is_null() {
            AnalyticsPayload::default()
        } else {
            task.payload_as()
                .map_err(|e| TaskError::unrecoverable(format!("invalid analytics payload: {}", e)))?
        };
        let now = Timestamp::now();
        let date = match payload.date {
            Some(date) => date,
            None => now.minus_days(1).date(),
        };
        self.aggregate(date, now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::InMemorySnapshotCache;
    use crate::adapters::memory::{InMemorySubscriptionRepository, InMemoryTransactionRepository};
    use crate::domain::foundation::{SubscriptionId, UserId};
    use crate::domain::jobs::{NewTask, TaskType};
    use crate::domain::subscription::{
        NewSubscription, Platform, PlanType, ReceiptHash, Subscription, Transaction,
    };

    // 2023-11-14T22:13:20Z
    const NOW: u64 = 1_700_000_000;

    async fn tx(repo: &InMemoryTransactionRepository, receipt: &str, cents: i64, at: u64) {
        let tx = Transaction::record(
            UserId::new("user-1").unwrap(),
            SubscriptionId::new(),
            cents,
            "USD",
            ReceiptHash::of(receipt).unwrap(),
            format!("tx-{}", receipt),
            Platform::Android,
            Timestamp::from_unix_secs(at),
        )
        .unwrap();
        repo.insert(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn aggregates_one_utc_day() {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let cache = Arc::new(InMemorySnapshotCache::new());
        let now = Timestamp::from_unix_secs(NOW);
        subscriptions
            .insert(&Subscription::activate(
                NewSubscription {
                    user_id: UserId::new("user-1").unwrap(),
                    plan_type: PlanType::Monthly,
                    source: Platform::Android,
                    product_id: "premium_monthly".to_string(),
                    provider_subscription_id: None,
                    expires_at: now.add_days(30),
                    auto_renew: true,
                },
                now,
            ))
            .await
            .unwrap();
        tx(&transactions, "in-day", 999, NOW).await;
        tx(&transactions, "next-day", 4_999, NOW + 86_400).await;

        let handler = DailyAnalyticsHandler::new(subscriptions, transactions, cache.clone());
        let date = now.date();
        handler.aggregate(date, now).await.unwrap();

        let snapshot = cache
            .get(&keys::daily_analytics(date))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot["revenue_cents"], 999);
        assert_eq!(snapshot["subscriptions_by_status"]["active"], 1);
        assert_eq!(snapshot["date"], "2023-11-14");
    }

    #[tokio::test]
    async fn explicit_date_in_payload() {
        let cache = Arc::new(InMemorySnapshotCache::new());
        let handler = DailyAnalyticsHandler::new(
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(InMemoryTransactionRepository::new()),
            cache.clone(),
        );
        let task = Task::from_new(
            NewTask::new(TaskType::DailyAnalytics, json!({"date": "2024-02-29"})),
            5,
            Timestamp::from_unix_secs(NOW),
        );

        handler.handle(&task).await.unwrap();

        assert!(cache.get("analytics:daily:2024-02-29").await.unwrap().is_some());
    }

    #[test]
    fn day_bounds_cover_24_hours() {
        let (from, to) = day_bounds(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert_eq!(from.as_unix_secs(), 1_704_067_200);
        assert_eq!(to.as_unix_secs() - from.as_unix_secs(), 86_400);
    }
}
