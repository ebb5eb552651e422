//! HTTP handlers for subscription endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::error::ApiError;
use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, GetSubscriptionHandler,
    GetSubscriptionQuery, ProcessReceiptCommand, ProcessReceiptHandler, SubscriptionView,
};
use crate::domain::foundation::Timestamp;

use super::dto::{CancelResponse, ReceiptResponse, SubmitReceiptRequest, SubscriptionResponse};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SubscriptionHandlers {
    get_handler: Arc<GetSubscriptionHandler>,
    receipt_handler: Arc<ProcessReceiptHandler>,
    cancel_handler: Arc<CancelSubscriptionHandler>,
}

impl SubscriptionHandlers {
    pub fn new(
        get_handler: Arc<GetSubscriptionHandler>,
        receipt_handler: Arc<ProcessReceiptHandler>,
        cancel_handler: Arc<CancelSubscriptionHandler>,
    ) -> Self {
        Self {
            get_handler,
            receipt_handler,
            cancel_handler,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// GET /subscriptions/me - The caller's subscription
pub async fn get_my_subscription(
    State(handlers): State<SubscriptionHandlers>,
    RequireAuth(ctx): RequireAuth,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let query = GetSubscriptionQuery {
        user_id: ctx.user_id,
    };
    let subscription = handlers.get_handler.handle(query, Timestamp::now()).await?;
    Ok(Json(SubscriptionResponse { subscription }))
}

/// POST /subscriptions/receipt - Submit a store receipt
///
/// Resubmitting a receipt is answered with the current subscription and
/// `duplicate: true`; nothing is recorded twice.
pub async fn submit_receipt(
    State(handlers): State<SubscriptionHandlers>,
    RequireAuth(ctx): RequireAuth,
    Json(req): Json<SubmitReceiptRequest>,
) -> Response {
    let cmd = ProcessReceiptCommand {
        user_id: ctx.user_id,
        platform: req.platform,
        receipt: req.receipt,
        product_id: req.product_id,
    };

    let now = Timestamp::now();
    match handlers.receipt_handler.handle(cmd, now).await {
        Ok(result) => {
            let response = ReceiptResponse {
                subscription: SubscriptionView::of(&result.subscription, now),
                duplicate: result.duplicate,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// POST /subscriptions/cancel - Cancel the caller's subscription
pub async fn cancel_subscription(
    State(handlers): State<SubscriptionHandlers>,
    RequireAuth(ctx): RequireAuth,
) -> Result<Json<CancelResponse>, ApiError> {
    let cmd = CancelSubscriptionCommand {
        user_id: ctx.user_id,
    };
    let now = Timestamp::now();
    let result = handlers.cancel_handler.handle(cmd, now).await?;
    Ok(Json(CancelResponse {
        subscription: SubscriptionView::of(&result.subscription, now),
        cancelled_now: result.cancelled_now,
    }))
}
