//! Outbound HTTP integrations

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationsConfig {
    /// Receipt verification service; POSTs `{platform, receipt, product_id}`
    pub receipt_verifier_url: String,

    /// Exchange rate endpoint; `{base}` is substituted
    #[serde(default = "default_fx_url")]
    pub fx_rates_url: String,

    /// Timeout for every outbound call in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl IntegrationsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Validate integration configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.receipt_verifier_url.trim().is_empty() {
            return Err(ValidationError::MissingRequired(
                "INTEGRATIONS__RECEIPT_VERIFIER_URL",
            ));
        }
        if !self.fx_rates_url.contains("{base}") {
            return Err(ValidationError::MissingRequired("INTEGRATIONS__FX_RATES_URL {base}"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            receipt_verifier_url: String::new(),
            fx_rates_url: default_fx_url(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_fx_url() -> String {
    "https://open.er-api.com/v6/latest/{base}".to_string()
}

fn default_http_timeout() -> u64 {
    10
}
