//! Subscription handlers: provider signals, receipts, cancel and lookup.

mod cancel_subscription;
mod get_subscription;
mod lifecycle;
mod process_receipt;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use get_subscription::{
    GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionResult, SubscriptionView,
};
pub use lifecycle::SubscriptionLifecycle;
pub use process_receipt::{ProcessReceiptCommand, ProcessReceiptHandler, ProcessReceiptResult};
