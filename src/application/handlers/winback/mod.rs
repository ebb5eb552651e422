//! Winback handlers. Offers are created by campaign tooling outside this
//! service; users answer them here and the sweep closes stale ones.

mod expire_offers;
mod respond_to_offer;

pub use expire_offers::ExpireWinbackOffersHandler;
pub use respond_to_offer::{
    RespondToOfferCommand, RespondToOfferResult, RespondToWinbackOfferHandler, WinbackResponse,
};
