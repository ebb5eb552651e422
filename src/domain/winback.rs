//! Winback offers: discounts extended to churned or at-risk users.

use crate::domain::foundation::{
    DomainError, ErrorCode, StateMachine, Timestamp, UserId, ValidationError, WinbackOfferId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a whole percentage, 0-100.
    Percentage,
    /// `value` is an amount in cents.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(format!("unknown discount type: {}", other)),
        }
    }
}

/// A validated discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub discount_type: DiscountType,
    pub value: i64,
}

/// Result of applying a discount to a total. Both fields are in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscountQuote {
    pub discount_cents: i64,
    pub final_cents: i64,
}

impl Discount {
    /// # Errors
    ///
    /// `OutOfRange` for percentages outside 0-100 or negative fixed amounts.
    pub fn new(discount_type: DiscountType, value: i64) -> Result<Self, ValidationError> {
        let max = match discount_type {
            DiscountType::Percentage => 100,
            DiscountType::Fixed => i64::MAX,
        };
        if !(0..=max).contains(&value) {
            return Err(ValidationError::out_of_range("discount_value", 0, max, value));
        }
        Ok(Self {
            discount_type,
            value,
        })
    }

    /// Applies the discount to `total_cents`.
    ///
    /// Percentages round half up to the nearest cent. The discount is capped
    /// at the total, so neither field is ever negative.
    pub fn apply(&self, total_cents: i64) -> DiscountQuote {
        let total = total_cents.max(0);
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let scaled = i128::from(total) * i128::from(self.value);
                ((scaled + 50) / 100) as i64
            }
            DiscountType::Fixed => self.value,
        };
        let discount_cents = raw.clamp(0, total);
        DiscountQuote {
            discount_cents,
            final_cents: total - discount_cents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinbackStatus {
    Offered,
    Accepted,
    Expired,
    Declined,
}

impl WinbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinbackStatus::Offered => "offered",
            WinbackStatus::Accepted => "accepted",
            WinbackStatus::Expired => "expired",
            WinbackStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for WinbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WinbackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offered" => Ok(WinbackStatus::Offered),
            "accepted" => Ok(WinbackStatus::Accepted),
            "expired" => Ok(WinbackStatus::Expired),
            "declined" => Ok(WinbackStatus::Declined),
            other => Err(format!("unknown winback status: {}", other)),
        }
    }
}

impl StateMachine for WinbackStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use WinbackStatus::*;
        matches!(
            (self, target),
            (Offered, Accepted) | (Offered, Declined) | (Offered, Expired)
                // Administrative only, see `WinbackOffer::expire_accepted`
                | (Accepted, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use WinbackStatus::*;
        match self {
            Offered => vec![Accepted, Declined, Expired],
            Accepted => vec![Expired],
            Expired | Declined => vec![],
        }
    }
}

/// A discount offer made to one user under one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinbackOffer {
    pub id: WinbackOfferId,
    pub user_id: UserId,
    pub campaign_id: String,
    pub discount: Discount,
    pub status: WinbackStatus,
    pub expires_at: Timestamp,
    pub responded_at: Option<Timestamp>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WinbackOffer {
    pub fn offer(
        user_id: UserId,
        campaign_id: impl Into<String>,
        discount: Discount,
        valid_for_days: i64,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let campaign_id = campaign_id.into();
        if campaign_id.trim().is_empty() {
            return Err(ValidationError::empty_field("campaign_id"));
        }
        if valid_for_days < 1 {
            return Err(ValidationError::out_of_range(
                "valid_for_days",
                1,
                i64::MAX,
                valid_for_days,
            ));
        }
        Ok(Self {
            id: WinbackOfferId::new(),
            user_id,
            campaign_id,
            discount,
            status: WinbackStatus::Offered,
            expires_at: now.add_days(valid_for_days),
            responded_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Quote for `total_cents` under this offer's discount.
    pub fn quote(&self, total_cents: i64) -> DiscountQuote {
        self.discount.apply(total_cents)
    }

    /// Accepts the offer.
    ///
    /// # Errors
    ///
    /// Fails if the offer expired (by status or by deadline) or was declined.
    /// Accepting twice is a no-op.
    pub fn accept(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        match self.status {
            WinbackStatus::Accepted => return Ok(false),
            WinbackStatus::Expired => return Err(self.reject("accept", "offer has expired")),
            WinbackStatus::Declined => {
                return Err(self.reject("accept", "offer was already declined"))
            }
            WinbackStatus::Offered => {}
        }
        if !now.is_before(&self.expires_at) {
            return Err(self.reject("accept", "offer has expired"));
        }
        self.status = self.status.transition_to(WinbackStatus::Accepted)?;
        self.responded_at = Some(now);
        self.updated_at = now;
        Ok(true)
    }

    /// Declines the offer.
    ///
    /// # Errors
    ///
    /// Fails if the offer was already accepted or has expired.
    /// Declining twice is a no-op.
    pub fn decline(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        match self.status {
            WinbackStatus::Declined => Ok(false),
            WinbackStatus::Accepted => Err(self.reject("decline", "offer was already accepted")),
            WinbackStatus::Expired => Err(self.reject("decline", "offer has expired")),
            WinbackStatus::Offered => {
                self.status = self.status.transition_to(WinbackStatus::Declined)?;
                self.responded_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    /// Expires an open offer whose deadline passed. Anything else is left alone.
    pub fn expire_if_due(&mut self, now: Timestamp) -> bool {
        if self.status != WinbackStatus::Offered || now.is_before(&self.expires_at) {
            return false;
        }
        self.status = WinbackStatus::Expired;
        self.updated_at = now;
        true
    }

    /// Administrative expiry of an accepted offer (e.g. refund of the
    /// discounted purchase). Never called by sweeps.
    pub fn expire_accepted(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if self.status != WinbackStatus::Accepted {
            return Err(self.reject("administratively expire", "offer is not accepted"));
        }
        self.status = self.status.transition_to(WinbackStatus::Expired)?;
        self.updated_at = now;
        Ok(())
    }

    fn reject(&self, action: &str, reason: &str) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!("cannot {} winback offer: {}", action, reason),
        )
        .with_detail("winback_offer_id", self.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    fn offer() -> WinbackOffer {
        WinbackOffer::offer(
            UserId::new("user-1").unwrap(),
            "spring-2024",
            Discount::new(DiscountType::Percentage, 25).unwrap(),
            7,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn quarter_off_99_99() {
        let quote = Discount::new(DiscountType::Percentage, 25)
            .unwrap()
            .apply(9_999);
        assert_eq!(quote.discount_cents, 2_500);
        assert_eq!(quote.final_cents, 7_499);
    }

    #[test]
    fn fixed_discount_caps_at_total() {
        let quote = Discount::new(DiscountType::Fixed, 5_000).unwrap().apply(3_000);
        assert_eq!(quote.discount_cents, 3_000);
        assert_eq!(quote.final_cents, 0);
    }

    #[test]
    fn discount_rejects_invalid_values() {
        assert!(Discount::new(DiscountType::Percentage, 101).is_err());
        assert!(Discount::new(DiscountType::Percentage, -5).is_err());
        assert!(Discount::new(DiscountType::Fixed, -1).is_err());
    }

    #[test]
    fn accept_open_offer() {
        let mut o = offer();
        assert!(o.accept(now()).unwrap());
        assert!(!o.accept(now()).unwrap());
        assert_eq!(o.status, WinbackStatus::Accepted);
    }

    #[test]
    fn accept_after_deadline_fails_even_before_sweep() {
        let mut o = offer();
        let err = o.accept(now().add_days(8)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(o.status, WinbackStatus::Offered);
    }

    #[test]
    fn accept_declined_fails() {
        let mut o = offer();
        o.decline(now()).unwrap();
        assert!(o.accept(now()).is_err());
    }

    #[test]
    fn decline_accepted_fails() {
        let mut o = offer();
        o.accept(now()).unwrap();
        assert!(o.decline(now()).is_err());
        assert_eq!(o.status, WinbackStatus::Accepted);
    }

    #[test]
    fn sweep_never_expires_accepted_offer() {
        let mut o = offer();
        o.accept(now()).unwrap();
        assert!(!o.expire_if_due(now().add_days(30)));
        assert_eq!(o.status, WinbackStatus::Accepted);
        o.expire_accepted(now().add_days(30)).unwrap();
        assert_eq!(o.status, WinbackStatus::Expired);
    }

    #[test]
    fn expire_if_due_respects_deadline() {
        let mut o = offer();
        assert!(!o.expire_if_due(now()));
        assert!(o.expire_if_due(now().add_days(7)));
        assert!(o.accept(now().add_days(7)).is_err());
    }

    proptest! {
        #[test]
        fn quote_is_never_negative_and_sums_to_total(
            total in 0i64..10_000_000,
            pct in 0i64..=100,
            fixed in 0i64..20_000_000,
        ) {
            for discount in [
                Discount::new(DiscountType::Percentage, pct).unwrap(),
                Discount::new(DiscountType::Fixed, fixed).unwrap(),
            ] {
                let q = discount.apply(total);
                prop_assert!(q.discount_cents >= 0);
                prop_assert!(q.final_cents >= 0);
                prop_assert!(q.discount_cents <= total);
                prop_assert_eq!(q.discount_cents + q.final_cents, total);
            }
        }
    }
}
