//! HTTP handlers for winback endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::error::{ApiError, ErrorResponse};
use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::winback::{
    RespondToOfferCommand, RespondToWinbackOfferHandler, WinbackResponse,
};
use crate::domain::foundation::{RequestContext, Timestamp, WinbackOfferId};

use super::dto::{AcceptOfferRequest, OfferResponse};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WinbackHandlers {
    respond_handler: Arc<RespondToWinbackOfferHandler>,
}

impl WinbackHandlers {
    pub fn new(respond_handler: Arc<RespondToWinbackOfferHandler>) -> Self {
        Self { respond_handler }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /winback/:id/accept - Accept an offer
pub async fn accept_offer(
    State(handlers): State<WinbackHandlers>,
    RequireAuth(ctx): RequireAuth,
    Path(offer_id): Path<String>,
    body: Option<Json<AcceptOfferRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    respond(&handlers, ctx, &offer_id, WinbackResponse::Accept, req.product_id).await
}

/// POST /winback/:id/decline - Decline an offer
pub async fn decline_offer(
    State(handlers): State<WinbackHandlers>,
    RequireAuth(ctx): RequireAuth,
    Path(offer_id): Path<String>,
) -> Response {
    respond(&handlers, ctx, &offer_id, WinbackResponse::Decline, None).await
}

async fn respond(
    handlers: &WinbackHandlers,
    ctx: RequestContext,
    offer_id: &str,
    response: WinbackResponse,
    product_id: Option<String>,
) -> Response {
    let offer_id = match offer_id.parse::<WinbackOfferId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Invalid offer ID")),
            )
                .into_response()
        }
    };

    let cmd = RespondToOfferCommand {
        user_id: ctx.user_id,
        offer_id,
        response,
        product_id,
    };

    match handlers.respond_handler.handle(cmd, Timestamp::now()).await {
        Ok(result) => (StatusCode::OK, Json(OfferResponse::from(result))).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockSessionValidator;
    use crate::adapters::http::middleware::{auth_middleware, AuthState};
    use crate::adapters::http::winback::winback_routes;
    use crate::adapters::memory::InMemoryWinbackRepository;
    use crate::domain::foundation::UserId;
    use crate::domain::subscription::{CatalogEntry, PlanType, ProductCatalog};
    use crate::domain::winback::{Discount, DiscountType, WinbackOffer};
    use crate::ports::WinbackRepository;
    use axum::{body::Body, http::Request, middleware, Router};
    use tower::ServiceExt;

    async fn app_with_offer(owner: &str) -> (Router, WinbackOfferId) {
        let offers = Arc::new(InMemoryWinbackRepository::new());
        let offer = WinbackOffer::offer(
            UserId::new(owner).unwrap(),
            "spring-return",
            Discount::new(DiscountType::Percentage, 25).unwrap(),
            7,
            Timestamp::now(),
        )
        .unwrap();
        offers.insert(&offer).await.unwrap();

        let catalog = ProductCatalog::new().with(
            "premium_annual",
            CatalogEntry {
                plan_type: PlanType::Annual,
                price_cents: 9999,
                currency: "USD".to_string(),
            },
        );
        let handlers = WinbackHandlers::new(Arc::new(RespondToWinbackOfferHandler::new(
            offers, catalog,
        )));
        let validator: AuthState =
            Arc::new(MockSessionValidator::new().with_test_user("token-1", "user-1"));
        let app = Router::new()
            .nest("/winback", winback_routes(handlers))
            .layer(middleware::from_fn_with_state(validator, auth_middleware));
        (app, offer.id)
    }

    fn post(uri: String, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", "Bearer token-1")
            .header("content-type", "application/json");
        match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accept_with_product_returns_quote() {
        let (app, id) = app_with_offer("user-1").await;

        let response = app
            .oneshot(post(
                format!("/winback/{}/accept", id),
                Some(serde_json::json!({"product_id": "premium_annual"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["changed"], true);
        assert_eq!(body["quote"]["discount_cents"], 2500);
        assert_eq!(body["quote"]["final_cents"], 7499);
    }

    #[tokio::test]
    async fn decline_twice_is_unchanged_the_second_time() {
        let (app, id) = app_with_offer("user-1").await;

        let first = app
            .clone()
            .oneshot(post(format!("/winback/{}/decline", id), None))
            .await
            .unwrap();
        assert_eq!(body_json(first).await["status"], "declined");

        let second = app
            .oneshot(post(format!("/winback/{}/decline", id), None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["changed"], false);
    }

    #[tokio::test]
    async fn someone_elses_offer_is_404() {
        let (app, id) = app_with_offer("user-2").await;

        let response = app
            .oneshot(post(format!("/winback/{}/accept", id), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_id_is_400() {
        let (app, _) = app_with_offer("user-1").await;

        let response = app
            .oneshot(post("/winback/not-a-uuid/accept".to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
