//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Request-path handlers take a command and return a result; job handlers
//! implement `TaskHandler` and are registered with the scheduler.

pub mod handlers;

pub use handlers::*;
