//! Request and response bodies for session token endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::auth::TokenPair;
use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub access_expires_at: Timestamp,
    pub refresh_token: String,
    pub refresh_expires_at: Timestamp,
    pub token_type: &'static str,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access.token,
            access_expires_at: pair.access.expires_at,
            refresh_token: pair.refresh.token,
            refresh_expires_at: pair.refresh.expires_at,
            token_type: "Bearer",
        }
    }
}
