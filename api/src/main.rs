use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod backend;
mod config;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Concierge API",
        version = "0.1.0",
        description = "Conversational ticket-upgrade assistant. Upgrade options are only disclosed for tickets validated in the same session."
    ),
    paths(
        routes::health::health_check,
        routes::chat::chat,
        routes::tickets::validate_ticket,
        routes::tickets::price_upgrade,
        routes::tickets::recommend_upgrades,
    ),
    components(schemas(
        HealthResponse,
        routes::chat::ChatRequest,
        routes::chat::ChatResponse,
        routes::tickets::ValidateRequest,
        routes::tickets::PricingRequest,
        routes::tickets::RecommendationRequest,
        concierge_core::error::ApiError,
        concierge_core::SessionContext,
        concierge_core::Turn,
        concierge_core::Sender,
        concierge_core::UiAction,
        concierge_core::UpgradeOption,
        concierge_core::TicketProfile,
        concierge_core::ConversationState,
        concierge_core::ValidationOutcome,
        concierge_core::PriceQuote,
        concierge_core::Recommendation,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn build_app(app_state: state::AppState, require_https: bool) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::chat::router().layer(middleware::rate_limit::chat_layer()))
        .merge(routes::tickets::router().layer(middleware::rate_limit::tickets_layer()))
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "concierge_api=debug,concierge_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::AppConfig::from_env();
    let app_state = match state::AppState::from_config(&config) {
        Ok(app_state) => app_state,
        Err(err) => {
            tracing::error!(error = %err, "failed to load ticket registry");
            std::process::exit(1);
        }
    };

    let app = build_app(app_state, config.require_https);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!("Concierge API listening on {}", addr);

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %err, "server exited");
        std::process::exit(1);
    }
}
