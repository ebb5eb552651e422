//! Product catalog and lifecycle settings

use serde::Deserialize;

use crate::domain::grace_period::{MAX_GRACE_DAYS, MIN_GRACE_DAYS};
use crate::domain::subscription::{CatalogEntry, PlanType, ProductCatalog};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Product id to plan and list price
    #[serde(default = "default_products")]
    pub products: ProductCatalog,

    /// Length of the grace period opened on a failed renewal
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i64,

    /// Retries in a dunning run before it is marked failed
    #[serde(default = "default_dunning_max_attempts")]
    pub dunning_max_attempts: u32,

    /// Currencies whose rates the refresh job keeps warm
    #[serde(default = "default_fx_bases")]
    pub fx_base_currencies: Vec<String>,
}

impl CatalogConfig {
    /// Validate catalog configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_GRACE_DAYS..=MAX_GRACE_DAYS).contains(&self.grace_period_days) {
            return Err(ValidationError::InvalidGracePeriod);
        }
        if let Some((id, _)) = self.products.iter().find(|(_, e)| e.price_cents < 0) {
            return Err(ValidationError::InvalidCatalogEntry(id.to_string()));
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            products: default_products(),
            grace_period_days: default_grace_period_days(),
            dunning_max_attempts: default_dunning_max_attempts(),
            fx_base_currencies: default_fx_bases(),
        }
    }
}

fn default_products() -> ProductCatalog {
    ProductCatalog::new()
        .with(
            "premium_monthly",
            CatalogEntry {
                plan_type: PlanType::Monthly,
                price_cents: 999,
                currency: "USD".to_string(),
            },
        )
        .with(
            "premium_annual",
            CatalogEntry {
                plan_type: PlanType::Annual,
                price_cents: 7999,
                currency: "USD".to_string(),
            },
        )
}

fn default_grace_period_days() -> i64 {
    16
}

fn default_dunning_max_attempts() -> u32 {
    5
}

fn default_fx_bases() -> Vec<String> {
    vec!["USD".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.grace_period_days, 16);
        assert_eq!(config.products.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grace_period_bounds() {
        for days in [0, 31] {
            let config = CatalogConfig {
                grace_period_days: days,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidGracePeriod));
        }
    }
}
