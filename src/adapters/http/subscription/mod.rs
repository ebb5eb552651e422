//! HTTP adapter for the caller's subscription.
//!
//! - `GET /subscriptions/me` - Current (or most recent) subscription
//! - `POST /subscriptions/receipt` - Submit a store receipt
//! - `POST /subscriptions/cancel` - Cancel immediately

mod dto;
mod handlers;
mod routes;

pub use dto::{CancelResponse, ReceiptResponse, SubmitReceiptRequest, SubscriptionResponse};
pub use handlers::SubscriptionHandlers;
pub use routes::{command_routes, polling_routes};
