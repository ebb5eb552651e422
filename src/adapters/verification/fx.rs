//! FX rates over HTTP.
//!
//! The URL template contains `{base}`; responses follow the
//! `{"result": "success", "base_code": ..., "rates": {...}}` shape.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{CurrencyRateSource, CurrencyRates};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
}

pub struct HttpCurrencyRateSource {
    url_template: String,
    http_client: reqwest::Client,
}

impl HttpCurrencyRateSource {
    pub fn new(url_template: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            url_template: url_template.into(),
            http_client,
        }
    }

    fn url_for(&self, base: &str) -> String {
        self.url_template.replace("{base}", &base.to_ascii_uppercase())
    }
}

fn unavailable(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::ExternalUnavailable, message)
}

fn into_rates(
    base: &str,
    response: RatesResponse,
    now: Timestamp,
) -> Result<CurrencyRates, DomainError> {
    if let Some(result) = response.result.as_deref() {
        if result != "success" {
            return Err(unavailable(format!("rate source reported {}", result)));
        }
    }
    let rates: BTreeMap<String, f64> = response
        .rates
        .into_iter()
        .filter(|(_, rate)| rate.is_finite() && *rate > 0.0)
        .collect();
    if rates.is_empty() {
        return Err(unavailable("rate source returned no rates"));
    }
    Ok(CurrencyRates {
        base: response
            .base_code
            .unwrap_or_else(|| base.to_ascii_uppercase()),
        rates,
        fetched_at: now,
    })
}

#[async_trait]
impl CurrencyRateSource for HttpCurrencyRateSource {
    async fn fetch(&self, base: &str) -> Result<CurrencyRates, DomainError> {
        let url = self.url_for(base);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("rate fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!(
                "rate source returned {}",
                response.status()
            )));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid rates response: {}", e)))?;
        into_rates(base, body, Timestamp::now())
    }
}

impl std::fmt::Debug for HttpCurrencyRateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCurrencyRateSource")
            .field("url_template", &self.url_template)
            .finish_non_exhaustive()
    }
}
