//! Webhook handlers: inbox receipt and the processing sweep.

mod process_webhooks;
mod receive_webhook;

pub use process_webhooks::{ProcessWebhooksHandler, WebhookSweepReport, MAX_EVENT_ATTEMPTS};
pub use receive_webhook::{ReceiveWebhookCommand, ReceiveWebhookHandler};
