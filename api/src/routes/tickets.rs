use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;

use concierge_core::error::ApiError;
use concierge_core::extract::find_ticket_id;
use concierge_core::{PriceQuote, Recommendation, TicketProfile, ValidationOutcome};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{ticket_id}/validate", post(validate_ticket))
        .route("/v1/tickets/{ticket_id}/pricing", post(price_upgrade))
        .route(
            "/v1/tickets/{ticket_id}/recommendations",
            post(recommend_upgrades),
        )
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Check eligibility for one specific tier
    #[serde(default)]
    pub upgrade_tier: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricingRequest {
    pub ticket_type: String,
    pub upgrade_tier: String,
    pub original_price: Decimal,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub current_tier: String,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

/// The path segment must be exactly one canonical ticket id.
fn parse_ticket_id(raw: &str) -> Result<String, AppError> {
    match find_ticket_id(raw) {
        Some(id) if id.len() == raw.trim().len() => Ok(id),
        _ => Err(AppError::Validation {
            message: "ticket_id must be a UUID".to_string(),
            field: Some("ticket_id".to_string()),
            received: Some(serde_json::Value::String(raw.to_string())),
            docs_hint: Some(
                "Ticket ids look like 550e8400-e29b-41d4-a716-446655440002.".to_string(),
            ),
        }),
    }
}

fn require_non_negative(field: &str, value: Decimal) -> Result<(), AppError> {
    if value.is_sign_negative() {
        return Err(AppError::Validation {
            message: format!("{field} must not be negative"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(value.to_string())),
            docs_hint: None,
        });
    }
    Ok(())
}

/// Validate a ticket for upgrades
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/validate",
    params(("ticket_id" = String, Path, description = "Ticket UUID")),
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Eligibility verdict", body = ValidationOutcome),
        (status = 400, description = "Malformed ticket id", body = ApiError),
        (status = 502, description = "Ticket service unavailable", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn validate_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    AppJson(req): AppJson<ValidateRequest>,
) -> Result<Json<ValidationOutcome>, AppError> {
    let ticket_id = parse_ticket_id(&ticket_id)?;
    let outcome = state
        .tickets
        .validate(&ticket_id, req.upgrade_tier.as_deref())
        .await?;
    tracing::info!(
        ticket_id = %ticket_id,
        eligible = outcome.eligible,
        reason = %outcome.reason,
        "ticket validated"
    );
    Ok(Json(outcome))
}

/// Quote an upgrade
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/pricing",
    params(("ticket_id" = String, Path, description = "Ticket UUID")),
    request_body = PricingRequest,
    responses(
        (status = 200, description = "Upgrade and total price", body = PriceQuote),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 502, description = "Pricing service unavailable", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn price_upgrade(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    AppJson(req): AppJson<PricingRequest>,
) -> Result<Json<PriceQuote>, AppError> {
    parse_ticket_id(&ticket_id)?;
    require_non_negative("originalPrice", req.original_price)?;
    let quote = state
        .pricing
        .price(&req.ticket_type, &req.upgrade_tier, req.original_price)
        .await?;
    Ok(Json(quote))
}

/// Recommend upgrades for a ticket
#[utoipa::path(
    post,
    path = "/v1/tickets/{ticket_id}/recommendations",
    params(("ticket_id" = String, Path, description = "Ticket UUID")),
    request_body = RecommendationRequest,
    responses(
        (status = 200, description = "Recommended options and best value", body = Recommendation),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 502, description = "Recommendation service unavailable", body = ApiError)
    ),
    tag = "tickets"
)]
pub async fn recommend_upgrades(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    AppJson(req): AppJson<RecommendationRequest>,
) -> Result<Json<Recommendation>, AppError> {
    let ticket_id = parse_ticket_id(&ticket_id)?;
    if let Some(price) = req.original_price {
        require_non_negative("originalPrice", price)?;
    }
    let profile = TicketProfile {
        ticket_id,
        current_tier: req.current_tier,
        original_price: req.original_price,
    };
    let recommendation = state
        .recommendations
        .recommend(&profile, &req.preferences)
        .await?;
    Ok(Json(recommendation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use concierge_core::DelegateSettings;
    use concierge_core::catalog::EXAMPLE_TICKET_ID;
    use concierge_core::reference::TicketRegistry;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post(uri: &str, body: Value) -> (StatusCode, Value) {
        let app = router().with_state(AppState::reference(
            TicketRegistry::demo(),
            DelegateSettings::default(),
        ));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn ticket_id_must_be_the_whole_segment() {
        assert_eq!(
            parse_ticket_id(&EXAMPLE_TICKET_ID.to_uppercase()).unwrap(),
            EXAMPLE_TICKET_ID
        );
        assert!(parse_ticket_id("550e8400-e29b").is_err());
        assert!(parse_ticket_id(&format!("x{EXAMPLE_TICKET_ID}")).is_err());
    }

    #[tokio::test]
    async fn demo_ticket_validates() {
        let (status, body) = post(
            &format!("/v1/tickets/{EXAMPLE_TICKET_ID}/validate"),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eligible"], true);
        assert_eq!(body["currentTier"], "standard");
        assert_eq!(body["availableUpgrades"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_ticket_is_ineligible_not_an_error() {
        let (status, body) = post(
            "/v1/tickets/00000000-0000-0000-0000-000000000000/validate",
            json!({"upgradeTier": "vip"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eligible"], false);
        assert_eq!(body["reason"], "ticket not found");
    }

    #[tokio::test]
    async fn malformed_ticket_id_is_a_400() {
        let (status, body) = post("/v1/tickets/not-a-ticket/validate", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "ticket_id");
    }

    #[tokio::test]
    async fn pricing_adds_upgrade_to_original() {
        let (status, body) = post(
            &format!("/v1/tickets/{EXAMPLE_TICKET_ID}/pricing"),
            json!({"ticketType": "standard", "upgradeTier": "premium", "originalPrice": 75}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["upgradePrice"].as_f64(), Some(100.0));
        assert_eq!(body["totalPrice"].as_f64(), Some(175.0));
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let (status, body) = post(
            &format!("/v1/tickets/{EXAMPLE_TICKET_ID}/pricing"),
            json!({"ticketType": "standard", "upgradeTier": "vip", "originalPrice": -5}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "originalPrice");
    }

    #[tokio::test]
    async fn recommendations_name_a_best_value() {
        let (status, body) = post(
            &format!("/v1/tickets/{EXAMPLE_TICKET_ID}/recommendations"),
            json!({"currentTier": "standard", "preferences": ["parking"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 2);
        assert!(body["bestValue"]["id"].is_string());
    }
}
