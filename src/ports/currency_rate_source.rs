//! CurrencyRateSource port - upstream FX rates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{DomainError, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRates {
    pub base: String,
    /// Units of each currency per one unit of `base`.
    pub rates: BTreeMap<String, f64>,
    pub fetched_at: Timestamp,
}

#[async_trait]
pub trait CurrencyRateSource: Send + Sync {
    async fn fetch(&self, base: &str) -> Result<CurrencyRates, DomainError>;
}
