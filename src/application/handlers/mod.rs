//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations, plus the
//! `TaskHandler` implementations the worker pool dispatches to.

pub mod auth;
pub mod grace;
pub mod jobs;
pub mod subscription;
pub mod webhook;
pub mod winback;

pub use auth::{
    IssueSessionHandler, LogoutCommand, LogoutHandler, RefreshSessionCommand,
    RefreshSessionHandler,
};
pub use grace::{
    ExpireGracePeriodsHandler, GraceSweepReport, ResolveGracePeriodCommand,
    ResolveGracePeriodHandler, ResolveGracePeriodResult, StartGracePeriodCommand,
    StartGracePeriodHandler, StartGracePeriodResult,
};
pub use jobs::{
    CurrencyRefreshHandler, DailyAnalyticsHandler, ExperimentArmMaintenanceHandler,
    LedgerSyncHandler, LtvRecomputeHandler, NotificationSendHandler, TaskEnqueuer,
};
pub use subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionResult, ProcessReceiptCommand,
    ProcessReceiptHandler, ProcessReceiptResult, SubscriptionLifecycle, SubscriptionView,
};
pub use webhook::{
    ProcessWebhooksHandler, ReceiveWebhookCommand, ReceiveWebhookHandler, WebhookSweepReport,
    MAX_EVENT_ATTEMPTS,
};
pub use winback::{
    ExpireWinbackOffersHandler, RespondToOfferCommand, RespondToOfferResult,
    RespondToWinbackOfferHandler, WinbackResponse,
};
