//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `auth` - JWT token service and session validation
//! - `cache` - Snapshot cache and experiment arm store (in-memory, Redis)
//! - `http` - REST API (axum)
//! - `memory` - In-memory repositories and task store
//! - `postgres` - PostgreSQL repositories and task store
//! - `rate_limiter` - Token bucket limiter (in-memory, Redis)
//! - `revocation` - Revoked token list (in-memory, Redis)
//! - `scheduler` - Worker pool, recurring tasks, stale lease reaper
//! - `verification` - Provider signature, receipt, and exchange rate clients

pub mod auth;
pub mod cache;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod rate_limiter;
pub mod revocation;
pub mod scheduler;
pub mod verification;
