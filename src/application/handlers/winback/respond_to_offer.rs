//! RespondToWinbackOfferHandler - accept or decline an offer.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId, WinbackOfferId};
use crate::domain::subscription::ProductCatalog;
use crate::domain::winback::{DiscountQuote, WinbackOffer};
use crate::ports::WinbackRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinbackResponse {
    Accept,
    Decline,
}

#[derive(Debug, Clone)]
pub struct RespondToOfferCommand {
    pub user_id: UserId,
    pub offer_id: WinbackOfferId,
    pub response: WinbackResponse,
    /// Product the discount is quoted against, when accepting.
    pub product_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RespondToOfferResult {
    pub offer: WinbackOffer,
    /// False when the same response was already recorded.
    pub changed: bool,
    pub quote: Option<DiscountQuote>,
}

pub struct RespondToWinbackOfferHandler {
    offers: Arc<dyn WinbackRepository>,
    catalog: ProductCatalog,
}

impl RespondToWinbackOfferHandler {
    pub fn new(offers: Arc<dyn WinbackRepository>, catalog: ProductCatalog) -> Self {
        Self { offers, catalog }
    }

    pub async fn handle(
        &self,
        cmd: RespondToOfferCommand,
        now: Timestamp,
    ) -> Result<RespondToOfferResult, DomainError> {
        let mut offer = self
            .offers
            .find_by_id(&cmd.offer_id)
            .await?
            // Someone else's offer looks the same as a missing one.
            .filter(|offer| offer.user_id == cmd.user_id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::WinbackOfferNotFound, "winback offer not found")
                    .with_detail("winback_offer_id", cmd.offer_id.to_string())
            })?;

        let changed = match cmd.response {
            WinbackResponse::Accept => offer.accept(now)?,
            WinbackResponse::Decline => offer.decline(now)?,
        };
        if changed {
            self.offers.update(&mut offer).await?;
            tracing::info!(
                winback_offer_id = %offer.id,
                campaign_id = %offer.campaign_id,
                status = %offer.status,
                "Winback offer answered"
            );
        }

        let quote = match (cmd.response, cmd.product_id.as_deref()) {
            (WinbackResponse::Accept, Some(product_id)) => {
                let entry = self.catalog.get(product_id).ok_or_else(|| {
                    DomainError::validation("product_id", "unknown product")
                        .with_detail("product_id", product_id)
                })?;
                Some(offer.quote(entry.price_cents))
            }
            _ => None,
        };

        Ok(RespondToOfferResult {
            offer,
            changed,
            quote,
        })
    }
}
