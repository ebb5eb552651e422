//! Foundation module - Shared domain primitives.
//!
//! Identifiers, time, errors, the state machine trait and request identity
//! used across every lifecycle module.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, AuthenticatedSession, RequestContext, Role};
pub use errors::{DomainError, ErrorCategory, ErrorCode, ValidationError};
pub use ids::{
    DunningId, GracePeriodId, SubscriptionId, TaskId, TransactionId, UserId, WinbackOfferId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
