//! Authentication adapters.
//!
//! - `jwt` - HS256 `TokenService` for access and refresh tokens
//! - `session` - `SessionValidator` that adds revocation checks, failing closed
//! - `mock` - Test implementation that doesn't sign anything

mod jwt;
mod mock;
mod session;

pub use jwt::{JwtKeys, JwtTokenService};
pub use mock::MockSessionValidator;
pub use session::RevocationAwareSessionValidator;
