//! Webhook domain module.
//!
//! # Module Structure
//!
//! - `provider` - accepted providers
//! - `event` - inbox rows, verified events, header access
//! - `errors` - WebhookError with retry and status semantics
//! - `stripe` - HMAC signature verification
//! - `apple` - JWS envelope parsing and notification payloads
//! - `google` - Pub/Sub push envelope parsing
//! - `signal` - provider events normalised to lifecycle signals

pub mod apple;
mod errors;
mod event;
pub mod google;
mod provider;
mod signal;
pub mod stripe;

pub use errors::WebhookError;
pub use event::{ReceiveOutcome, VerifiedEvent, WebhookEvent, WebhookHeaders};
pub use provider::Provider;
pub use signal::{interpret, LifecycleSignal, SignalKind};
pub use stripe::StripeSignatureVerifier;
