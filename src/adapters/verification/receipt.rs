//! Receipt validation over HTTP.
//!
//! POSTs `{platform, receipt, product_id}` to the configured verifier and
//! reads back a `VerifiedReceipt`. A 4xx answer or `valid: false` is a
//! rejection; transport failures and 5xx are `Unavailable`.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::subscription::Platform;
use crate::ports::{ReceiptError, ReceiptRequest, ReceiptVerifier, VerifiedReceipt};

#[derive(Debug, Serialize)]
struct VerifyRequestBody<'a> {
    platform: Platform,
    receipt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<&'a str>,
}

pub struct HttpReceiptVerifier {
    url: String,
    http_client: reqwest::Client,
}

impl HttpReceiptVerifier {
    pub fn new(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl ReceiptVerifier for HttpReceiptVerifier {
    async fn verify(&self, request: &ReceiptRequest) -> Result<VerifiedReceipt, ReceiptError> {
        let body = VerifyRequestBody {
            platform: request.platform,
            receipt: &request.receipt,
            product_id: request.product_id.as_deref(),
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(platform = %request.platform, "Receipt verifier request failed: {}", e);
                ReceiptError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            tracing::info!(platform = %request.platform, %status, "Receipt rejected");
            return Err(ReceiptError::Rejected(truncate(&detail, 200)));
        }
        if !status.is_success() {
            tracing::warn!(platform = %request.platform, %status, "Receipt verifier error");
            return Err(ReceiptError::Unavailable(format!("verifier returned {}", status)));
        }

        let verified: VerifiedReceipt = response
            .json()
            .await
            .map_err(|e| ReceiptError::Unavailable(format!("invalid verifier response: {}", e)))?;
        check_verified(verified)
    }
}

fn check_verified(verified: VerifiedReceipt) -> Result<VerifiedReceipt, ReceiptError> {
    if !verified.valid {
        return Err(ReceiptError::Rejected("store reported receipt invalid".to_string()));
    }
    if verified.transaction_id.trim().is_empty() || verified.product_id.trim().is_empty() {
        return Err(ReceiptError::Rejected(
            "verifier response missing transaction or product".to_string(),
        ));
    }
    Ok(verified)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl std::fmt::Debug for HttpReceiptVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReceiptVerifier")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
