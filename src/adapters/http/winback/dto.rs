//! Request and response bodies for winback endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::winback::RespondToOfferResult;
use crate::domain::foundation::{Timestamp, WinbackOfferId};
use crate::domain::winback::{Discount, DiscountQuote, WinbackStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptOfferRequest {
    /// Product to price the discount against.
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferResponse {
    pub id: WinbackOfferId,
    pub campaign_id: String,
    pub status: WinbackStatus,
    pub discount: Discount,
    pub expires_at: Timestamp,
    pub responded_at: Option<Timestamp>,
    /// False when this response had already been recorded.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<DiscountQuote>,
}

impl From<RespondToOfferResult> for OfferResponse {
    fn from(result: RespondToOfferResult) -> Self {
        let offer = result.offer;
        Self {
            id: offer.id,
            campaign_id: offer.campaign_id,
            status: offer.status,
            discount: offer.discount,
            expires_at: offer.expires_at,
            responded_at: offer.responded_at,
            changed: result.changed,
            quote: result.quote,
        }
    }
}
