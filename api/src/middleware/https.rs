use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Middleware that enforces HTTPS via the `X-Forwarded-Proto` header.
///
/// Enabled with `CONCIERGE_REQUIRE_HTTPS`. A proxy-reported `http` request is
/// 301-redirected to its HTTPS equivalent. All responses get an HSTS header.
pub async fn require_https(req: Request, next: Next) -> Response {
    if let Some(location) = redirect_target(req.headers(), req.uri()) {
        let mut response =
            (StatusCode::MOVED_PERMANENTLY, [("location", location)]).into_response();
        add_hsts_header(&mut response);
        return response;
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

/// HTTPS location for a request that arrived over plain HTTP.
pub fn redirect_target(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    if !proto.eq_ignore_ascii_case("http") {
        return None;
    }

    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("https://{host}{path_and_query}")
        .parse::<Uri>()
        .ok()
        .map(|uri| uri.to_string())
}

fn add_hsts_header(response: &mut Response) {
    response.headers_mut().insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
}
