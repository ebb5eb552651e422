//! Error responses shared by every route.
//!
//! Domain errors map to the smallest faithful status through
//! `ErrorCode::http_status`. Security rejections and infrastructure
//! failures get a fixed message so nothing internal reaches the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::foundation::{DomainError, ErrorCategory};

/// Error body returned by all endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unavailable() -> Self {
        Self::new("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
    }

    pub fn internal() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// API error type that converts domain errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn body(&self) -> ErrorResponse {
        let err = &self.0;
        match err.category() {
            ErrorCategory::Unavailable => ErrorResponse::unavailable(),
            ErrorCategory::Internal => ErrorResponse::internal(),
            ErrorCategory::Security => ErrorResponse::new(err.code.to_string(), "Request rejected"),
            ErrorCategory::Validation => {
                let mut body = ErrorResponse::new(err.code.to_string(), err.message.clone());
                if !err.details.is_empty() {
                    body.details = serde_json::to_value(&err.details).ok();
                }
                body
            }
            _ => ErrorResponse::new(err.code.to_string(), err.message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = %self.0.code, "Request failed: {}", self.0.message);
        } else {
            tracing::debug!(code = %self.0.code, "Request refused: {}", self.0.message);
        }
        (status, Json(self.body())).into_response()
    }
}
