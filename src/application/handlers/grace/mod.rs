//! Grace period handlers: start on renewal failure, resolve on recovery,
//! and the recurring expiry sweep.

mod expire_grace_periods;
mod resolve_grace_period;
mod start_grace_period;

pub use expire_grace_periods::{ExpireGracePeriodsHandler, GraceSweepReport};
pub use resolve_grace_period::{
    ResolveGracePeriodCommand, ResolveGracePeriodHandler, ResolveGracePeriodResult,
};
pub use start_grace_period::{
    StartGracePeriodCommand, StartGracePeriodHandler, StartGracePeriodResult,
};
