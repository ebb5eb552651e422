//! Domain layer: lifecycle entities and their state machines, webhook
//! payload handling, background task model and session tokens. No I/O.
//!
//! # Module Organization
//!
//! - `foundation` - ids, timestamps, errors, the `StateMachine` trait, request context
//! - `subscription` - subscriptions, transactions, platforms and plans
//! - `grace_period`, `dunning`, `winback` - recovery lifecycles
//! - `webhook` - provider events, verification and lifecycle signals
//! - `jobs` - tasks, retry policy, queue weighting, recurring schedules
//! - `experiment` - bandit arm statistics
//! - `auth` - session token claims

pub mod auth;
pub mod dunning;
pub mod experiment;
pub mod foundation;
pub mod grace_period;
pub mod jobs;
pub mod subscription;
pub mod webhook;
pub mod winback;
