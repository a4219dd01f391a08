use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

pub const CORS_ORIGINS_ENV: &str = "CONCIERGE_CORS_ORIGINS";
const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// Build a CORS layer from the `CONCIERGE_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: `http://localhost:3000`)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Content-Type
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let raw = std::env::var(CORS_ORIGINS_ENV).unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());
    let origins = parse_origins(&raw);
    tracing::debug!(origins = origins.len(), "cors origins configured");

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type")])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Distinct, valid origins from a comma-separated list.
pub fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    let mut seen: Vec<String> = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let origin = origin.trim_end_matches('/');
        if !seen.iter().any(|existing| existing.eq_ignore_ascii_case(origin)) {
            seen.push(origin.to_string());
        }
    }
    seen.into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid cors origin");
                None
            }
        })
        .collect()
}
