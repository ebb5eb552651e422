//! ProcessWebhooksHandler - the inbox sweep.
//!
//! Picks up unprocessed events, turns each into a lifecycle signal and
//! applies it. Permanent failures close the event as failed, never as
//! processed; retryable ones stay open for the next sweep until the attempt
//! cap. Events that already failed an attempt queue behind fresh ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::handlers::subscription::SubscriptionLifecycle;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{Task, TaskError};
use crate::domain::webhook::{interpret, WebhookError, WebhookEvent};
use crate::ports::{TaskHandler, WebhookEventRepository};

/// Sweep attempts before a retryable event is closed anyway.
pub const MAX_EVENT_ATTEMPTS: i32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebhookSweepReport {
    pub processed: u32,
    pub ignored: u32,
    pub retrying: u32,
    pub failed: u32,
}

enum EventOutcome {
    Applied,
    Ignored,
    Retry,
    Failed,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPayload {
    #[serde(default)]
    batch_size: Option<u32>,
}

pub struct ProcessWebhooksHandler {
    events: Arc<dyn WebhookEventRepository>,
    lifecycle: Arc<SubscriptionLifecycle>,
    batch_size: u32,
}

impl ProcessWebhooksHandler {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        lifecycle: Arc<SubscriptionLifecycle>,
        batch_size: u32,
    ) -> Self {
        Self {
            events,
            lifecycle,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn sweep(&self, now: Timestamp, batch_size: u32) -> Result<WebhookSweepReport, DomainError> {
        let mut report = WebhookSweepReport::default();
        for event in self.events.list_unprocessed(batch_size).await? {
            match self.process_one(&event, now).await {
                Ok(EventOutcome::Applied) => report.processed += 1,
                Ok(EventOutcome::Ignored) => report.ignored += 1,
                Ok(EventOutcome::Retry) => report.retrying += 1,
                Ok(EventOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    // Bookkeeping failed; the event stays open and is picked up again.
                    report.retrying += 1;
                    tracing::warn!(
                        provider = %event.provider,
                        event_id = %event.event_id,
                        error = %e,
                        "Failed to update inbox row"
                    );
                }
            }
        }
        if report != WebhookSweepReport::default() {
            tracing::info!(
                processed = report.processed,
                ignored = report.ignored,
                retrying = report.retrying,
                failed = report.failed,
                "Webhook sweep finished"
            );
        }
        Ok(report)
    }

    async fn process_one(&self, event: &WebhookEvent, now: Timestamp) -> Result<EventOutcome, DomainError> {
        let result = match interpret(event) {
            Ok(signal) => self
                .lifecycle
                .apply(event.provider, &signal, now)
                .await
                .map(|_| ())
                .map_err(WebhookError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.events.mark_processed(event.provider, &event.event_id, now).await?;
                tracing::debug!(provider = %event.provider, event_id = %event.event_id, "Webhook applied");
                Ok(EventOutcome::Applied)
            }
            Err(WebhookError::Ignored(reason)) => {
                self.events.mark_processed(event.provider, &event.event_id, now).await?;
                tracing::debug!(provider = %event.provider, event_id = %event.event_id, reason = %reason, "Webhook ignored");
                Ok(EventOutcome::Ignored)
            }
            Err(e) if e.is_retryable() && event.attempts + 1 < MAX_EVENT_ATTEMPTS => {
                self.events
                    .record_failure(event.provider, &event.event_id, &e.to_string())
                    .await?;
                tracing::warn!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    attempts = event.attempts + 1,
                    error = %e,
                    "Webhook processing failed, will retry"
                );
                Ok(EventOutcome::Retry)
            }
            Err(e) => {
                self.events
                    .mark_failed(event.provider, &event.event_id, &e.to_string(), now)
                    .await?;
                tracing::error!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook processing failed permanently"
                );
                Ok(EventOutcome::Failed)
            }
        }
    }
}

#[async_trait]
impl TaskHandler for ProcessWebhooksHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: SweepPayload = if task.payload.is_null() {
            SweepPayload::default()
        } else {
            task.payload_as()
                .map_err(|e| TaskError::unrecoverable(format!("invalid payload: {}", e)))?
        };
        let batch_size = payload.batch_size.unwrap_or(self.batch_size).max(1);
        self.sweep(Timestamp::now(), batch_size).await?;
        Ok(())
    }
}
