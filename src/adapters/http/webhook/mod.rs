//! HTTP adapter for provider webhooks.
//!
//! - `POST /webhook/:provider` - Verify and record a Stripe, Apple or Google notification
//!
//! No user authentication: authenticity comes from the provider's signature.

mod handlers;
mod routes;

pub use handlers::{WebhookAck, WebhookHandlers};
pub use routes::webhook_routes;
