//! Scheduled job handlers and the enqueue helper shared by other handlers.

mod analytics;
mod currency;
mod enqueue;
mod experiment_arms;
mod ltv;
mod notifications;

pub use analytics::DailyAnalyticsHandler;
pub use currency::CurrencyRefreshHandler;
pub use enqueue::TaskEnqueuer;
pub use experiment_arms::ExperimentArmMaintenanceHandler;
pub use ltv::LtvRecomputeHandler;
pub use notifications::{LedgerSyncHandler, NotificationSendHandler};
