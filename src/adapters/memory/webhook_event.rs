//! In-memory WebhookEventRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::webhook::{Provider, WebhookEvent};
use crate::ports::{SaveResult, WebhookEventRepository};

type Key = (Provider, String);

#[derive(Debug, Default)]
pub struct InMemoryWebhookEventRepository {
    rows: RwLock<HashMap<Key, WebhookEvent>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn not_found(provider: Provider, event_id: &str) -> DomainError {
    DomainError::new(ErrorCode::NotFound, "Webhook event not found")
        .with_detail("provider", provider.as_str())
        .with_detail("event_id", event_id)
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        let mut rows = self.rows.write().await;
        let key = (event.provider, event.event_id.clone());
        if rows.contains_key(&key) {
            return Ok(SaveResult::AlreadyExists);
        }
        rows.insert(key, event.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&(provider, event_id.to_string()))
            .cloned())
    }

    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let mut pending: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|e| e.is_open())
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.attempts
                .cmp(&b.attempts)
                .then_with(|| a.received_at.cmp(&b.received_at))
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let mut failed: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|e| e.is_failed())
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }

    async fn mark_processed(
        &self,
        provider: Provider,
        event_id: &str,
        at: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        let event = rows
            .get_mut(&(provider, event_id.to_string()))
            .ok_or_else(|| not_found(provider, event_id))?;
        if !event.is_open() {
            return Ok(false);
        }
        event.processed_at = Some(at);
        event.last_error = None;
        Ok(true)
    }

    async fn record_failure(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
    ) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let event = rows
            .get_mut(&(provider, event_id.to_string()))
            .ok_or_else(|| not_found(provider, event_id))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_failed(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let event = rows
            .get_mut(&(provider, event_id.to_string()))
            .ok_or_else(|| not_found(provider, event_id))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        event.failed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::VerifiedEvent;
    use serde_json::json;

    fn event(id: &str, at: u64) -> WebhookEvent {
        WebhookEvent::received(
            VerifiedEvent {
                provider: Provider::Stripe,
                event_id: id.to_string(),
                event_type: "invoice.paid".to_string(),
                payload: json!({"id": id}),
            },
            format!(r#"{{"id":"{}"}}"#, id),
            Timestamp::from_unix_secs(at),
        )
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported_not_raised() {
        let repo = InMemoryWebhookEventRepository::new();
        assert_eq!(repo.insert(&event("evt_1", 1)).await.unwrap(), SaveResult::Inserted);
        assert_eq!(
            repo.insert(&event("evt_1", 2)).await.unwrap(),
            SaveResult::AlreadyExists
        );
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn same_event_id_from_other_provider_is_distinct() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.insert(&event("evt_1", 1)).await.unwrap();
        let mut apple = event("evt_1", 1);
        apple.provider = Provider::Apple;
        assert_eq!(repo.insert(&apple).await.unwrap(), SaveResult::Inserted);
    }

    #[tokio::test]
    async fn processing_lifecycle() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.insert(&event("evt_2", 2)).await.unwrap();
        repo.insert(&event("evt_1", 1)).await.unwrap();

        let pending = repo.list_unprocessed(10).await.unwrap();
        assert_eq!(
            pending.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
            vec!["evt_1", "evt_2"]
        );

        repo.record_failure(Provider::Stripe, "evt_1", "boom").await.unwrap();
        let failed = repo.find(Provider::Stripe, "evt_1").await.unwrap().unwrap();
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));

        let now = Timestamp::from_unix_secs(10);
        assert!(repo.mark_processed(Provider::Stripe, "evt_1", now).await.unwrap());
        assert!(!repo.mark_processed(Provider::Stripe, "evt_1", now).await.unwrap());
        assert_eq!(repo.list_unprocessed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_events_leave_the_queue_without_looking_processed() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.insert(&event("evt_1", 1)).await.unwrap();
        let at = Timestamp::from_unix_secs(10);

        repo.mark_failed(Provider::Stripe, "evt_1", "missing metadata", at)
            .await
            .unwrap();

        let stored = repo.find(Provider::Stripe, "evt_1").await.unwrap().unwrap();
        assert!(!stored.is_processed());
        assert_eq!(stored.failed_at, Some(at));
        assert_eq!(stored.attempts, 1);
        assert!(repo.list_unprocessed(10).await.unwrap().is_empty());
        assert_eq!(repo.list_failed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn events_with_failed_attempts_yield_to_fresh_ones() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.insert(&event("evt_old", 1)).await.unwrap();
        repo.insert(&event("evt_new", 5)).await.unwrap();
        repo.record_failure(Provider::Stripe, "evt_old", "subscription not found")
            .await
            .unwrap();

        let next = repo.list_unprocessed(1).await.unwrap();
        assert_eq!(next[0].event_id, "evt_new");
    }

    #[tokio::test]
    async fn mark_unknown_event_fails() {
        let repo = InMemoryWebhookEventRepository::new();
        let err = repo
            .mark_processed(Provider::Google, "nope", Timestamp::from_unix_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
