//! Webhook providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::subscription::Platform;

use super::WebhookError;

/// A payment provider that delivers webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// HMAC-signed body.
    Stripe,
    /// JWS envelope signed by a key named in its header.
    Apple,
    /// Pub/Sub push with an audience-scoped OIDC bearer token.
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Stripe, Provider::Apple, Provider::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Apple => "apple",
            Provider::Google => "google",
        }
    }

    /// The purchase platform this provider reports on.
    pub fn platform(&self) -> Platform {
        match self {
            Provider::Stripe => Platform::Stripe,
            Provider::Apple => Platform::Ios,
            Provider::Google => Platform::Android,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Provider::Stripe),
            "apple" => Ok(Provider::Apple),
            "google" => Ok(Provider::Google),
            other => Err(WebhookError::UnknownProvider(other.to_string())),
        }
    }
}
