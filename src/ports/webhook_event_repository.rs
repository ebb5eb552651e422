//! WebhookEventRepository port - the idempotent inbox.
//!
//! Providers deliver the same event more than once (timeouts, retries after a
//! non-2xx, lost acknowledgements). Rows are unique on `(provider, event_id)`
//! and a second insert is reported, not raised.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::{Provider, WebhookEvent};

/// Result of attempting to save a record with a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this key).
    Inserted,
    /// Record already exists (duplicate).
    AlreadyExists,
}

/// Port for the webhook inbox.
///
/// Implementations should use database constraints (UNIQUE on provider and
/// event_id) to prevent race conditions during concurrent deliveries.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Records a verified event.
    ///
    /// Uses `ON CONFLICT DO NOTHING` semantics to handle race conditions.
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError>;

    async fn find(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError>;

    /// Open events (neither processed nor failed), fewest attempts first and
    /// then oldest, so an event that keeps failing yields to newer ones.
    async fn list_unprocessed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError>;

    /// Events the sweep gave up on, most recent first.
    async fn list_failed(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError>;

    /// Marks an event processed. Returns false if it already was.
    async fn mark_processed(
        &self,
        provider: Provider,
        event_id: &str,
        at: Timestamp,
    ) -> Result<bool, DomainError>;

    /// Bumps the attempt counter and stores the error; the event stays unprocessed.
    async fn record_failure(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
    ) -> Result<(), DomainError>;

    /// Closes the event without applying it: bumps the attempt counter, stores
    /// the error and sets `failed_at`. `processed_at` is left empty.
    async fn mark_failed(
        &self,
        provider: Provider,
        event_id: &str,
        error: &str,
        at: Timestamp,
    ) -> Result<(), DomainError>;
}
