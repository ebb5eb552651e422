//! HTTP adapter for winback offers.
//!
//! - `POST /winback/:id/accept` - Accept an offer, optionally quoting it against a product
//! - `POST /winback/:id/decline` - Decline an offer

mod dto;
mod handlers;
mod routes;

pub use dto::{AcceptOfferRequest, OfferResponse};
pub use handlers::WinbackHandlers;
pub use routes::winback_routes;
