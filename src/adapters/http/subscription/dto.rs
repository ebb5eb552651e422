//! Request and response bodies for subscription endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::subscription::SubscriptionView;
use crate::domain::subscription::Platform;

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    /// `None` when the caller never subscribed.
    pub subscription: Option<SubscriptionView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReceiptRequest {
    pub platform: Platform,
    pub receipt: String,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptResponse {
    pub subscription: SubscriptionView,
    /// True when this receipt had already been processed.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub subscription: SubscriptionView,
    pub cancelled_now: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_request_reads_platform_in_snake_case() {
        let req: SubmitReceiptRequest =
            serde_json::from_str(r#"{"platform":"ios","receipt":"MIIT..."}"#).unwrap();
        assert_eq!(req.platform, Platform::Ios);
        assert!(req.product_id.is_none());
    }
}
