//! Purchase source and plan type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a subscription was purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// App Store (receipts and server notifications signed by Apple).
    Ios,
    /// Google Play (purchase tokens and Pub/Sub notifications).
    Android,
    /// Web checkout through Stripe.
    Stripe,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Stripe => "stripe",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" | "apple" => Ok(Platform::Ios),
            "android" | "google" => Ok(Platform::Android),
            "stripe" | "web" => Ok(Platform::Stripe),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Billing cadence of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Annual,
    Lifetime,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Annual => "annual",
            PlanType::Lifetime => "lifetime",
        }
    }

    /// Nominal period length in days, `None` for lifetime.
    pub fn period_days(&self) -> Option<i64> {
        match self {
            PlanType::Monthly => Some(30),
            PlanType::Annual => Some(365),
            PlanType::Lifetime => None,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PlanType::Monthly),
            "annual" | "yearly" => Ok(PlanType::Annual),
            "lifetime" => Ok(PlanType::Lifetime),
            other => Err(format!("unknown plan type: {}", other)),
        }
    }
}
