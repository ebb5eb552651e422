//! Product catalog: what a store product id buys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::PlanType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub plan_type: PlanType,
    /// List price, used when the store does not report the charged amount.
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Product id to plan mapping, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCatalog {
    products: BTreeMap<String, CatalogEntry>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, product_id: &str, entry: CatalogEntry) -> Self {
        self.products.insert(product_id.to_lowercase(), entry);
        self
    }

    pub fn get(&self, product_id: &str) -> Option<&CatalogEntry> {
        self.products
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(product_id))
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.products.iter().map(|(id, entry)| (id.as_str(), entry))
    }
}
