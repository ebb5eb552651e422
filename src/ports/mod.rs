//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository`, `GracePeriodRepository`, `DunningRepository`,
//!   `WinbackRepository` - lifecycle entities, compare-and-swap on `version`
//! - `TransactionRepository` - payment ledger, unique on receipt hash
//! - `WebhookEventRepository` - idempotent webhook inbox
//! - `TaskStore` - durable scheduler queue
//! - `TaskHandler` - one handler per task type, run by the worker pool
//!
//! ## Cache Ports
//!
//! - `RevocationStore` - revoked token ids, fails closed
//! - `RateLimiter` - token-bucket admission control
//! - `SnapshotCache`, `ExperimentArmStore` - derived state
//!
//! ## External Service Ports
//!
//! - `WebhookVerifier`, `KeySetProvider` - inbound authenticity
//! - `ReceiptVerifier`, `CurrencyRateSource` - upstream lookups
//! - `TokenService`, `SessionValidator` - session tokens

mod currency_rate_source;
mod dunning_repository;
mod experiment_arm_store;
mod grace_period_repository;
mod key_set_provider;
mod rate_limiter;
mod receipt_verifier;
mod revocation_store;
mod session_validator;
mod snapshot_cache;
mod subscription_repository;
mod task_handler;
mod task_store;
mod token_service;
mod transaction_repository;
mod webhook_event_repository;
mod webhook_verifier;
mod winback_repository;

pub use currency_rate_source::{CurrencyRateSource, CurrencyRates};
pub use dunning_repository::DunningRepository;
pub use experiment_arm_store::ExperimentArmStore;
pub use grace_period_repository::GracePeriodRepository;
pub use key_set_provider::{KeySetError, KeySetProvider};
pub use rate_limiter::{
    BucketPolicy, RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use receipt_verifier::{ReceiptError, ReceiptRequest, ReceiptVerifier, VerifiedReceipt};
pub use revocation_store::{RevocationError, RevocationStore};
pub use session_validator::SessionValidator;
pub use snapshot_cache::{keys as cache_keys, SnapshotCache};
pub use subscription_repository::SubscriptionRepository;
pub use task_handler::TaskHandler;
pub use task_store::{EnqueueResult, ReapReport, TaskStore};
pub use token_service::TokenService;
pub use transaction_repository::TransactionRepository;
pub use webhook_event_repository::{SaveResult, WebhookEventRepository};
pub use webhook_verifier::WebhookVerifier;
pub use winback_repository::WinbackRepository;
