//! Notification and ledger hand-offs.
//!
//! Delivery and bookkeeping live in other systems. These handlers validate
//! the payload and record the intent in the log.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::jobs::{Task, TaskError};
use crate::ports::TaskHandler;

#[derive(Debug, Deserialize)]
struct NotificationPayload {
    user_id: String,
    template: String,
}

#[derive(Debug, Default)]
pub struct NotificationSendHandler;

impl NotificationSendHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskHandler for NotificationSendHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: NotificationPayload = task
            .payload_as()
            .map_err(|e| TaskError::unrecoverable(format!("invalid notification payload: {}", e)))?;
        tracing::info!(
            task.id = %task.id,
            user_id = %payload.user_id,
            template = %payload.template,
            "Notification send requested"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LedgerPayload {
    transaction_id: String,
    amount_cents: i64,
    currency: String,
}

#[derive(Debug, Default)]
pub struct LedgerSyncHandler;

impl LedgerSyncHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskHandler for LedgerSyncHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: LedgerPayload = task
            .payload_as()
            .map_err(|e| TaskError::unrecoverable(format!("invalid ledger payload: {}", e)))?;
        tracing::info!(
            task.id = %task.id,
            transaction_id = %payload.transaction_id,
            amount_cents = payload.amount_cents,
            currency = %payload.currency,
            "Ledger sync requested"
        );
        Ok(())
    }
}
