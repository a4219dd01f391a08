//! HTTP adapters for remote collaborators.

use async_trait::async_trait;
use concierge_core::{
    PriceQuote, PricingService, ReasoningDelegate, Recommendation, RecommendationService,
    TicketProfile, TicketValidator, UpstreamError, ValidationOutcome,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Fields a reasoning service may put its reply text in, in lookup order.
const REPLY_TEXT_FIELDS: [&str; 4] = ["output", "response", "text", "message"];

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn map_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

async fn post_json<B, T>(client: &reqwest::Client, url: &str, body: &B) -> Result<T, UpstreamError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(map_transport)?;
    let status = response.status();
    if !status.is_success() {
        tracing::warn!(url, status = %status, "upstream returned non-success status");
        return Err(UpstreamError::Status(status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| UpstreamError::Decode(err.to_string()))
}

/// Remote ticket service: validation, pricing and recommendations.
///
/// Endpoints, relative to the base URL:
/// `POST tickets/{id}/validate`, `POST pricing`, `POST recommendations`.
#[derive(Clone)]
pub struct TicketServiceClient {
    client: reqwest::Client,
    base: Url,
}

impl TicketServiceClient {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    upgrade_tier: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PricingBody<'a> {
    ticket_type: &'a str,
    upgrade_tier: &'a str,
    original_price: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationBody<'a> {
    ticket_profile: &'a TicketProfile,
    preferences: &'a [String],
}

#[async_trait]
impl TicketValidator for TicketServiceClient {
    async fn validate(
        &self,
        ticket_id: &str,
        upgrade_tier: Option<&str>,
    ) -> Result<ValidationOutcome, UpstreamError> {
        let url = endpoint(&self.base, &format!("tickets/{ticket_id}/validate"));
        post_json(&self.client, &url, &ValidateBody { upgrade_tier }).await
    }
}

#[async_trait]
impl PricingService for TicketServiceClient {
    async fn price(
        &self,
        ticket_type: &str,
        upgrade_tier: &str,
        original_price: Decimal,
    ) -> Result<PriceQuote, UpstreamError> {
        let body = PricingBody {
            ticket_type,
            upgrade_tier,
            original_price,
        };
        post_json(&self.client, &endpoint(&self.base, "pricing"), &body).await
    }
}

#[async_trait]
impl RecommendationService for TicketServiceClient {
    async fn recommend(
        &self,
        profile: &TicketProfile,
        preferences: &[String],
    ) -> Result<Recommendation, UpstreamError> {
        let body = RecommendationBody {
            ticket_profile: profile,
            preferences,
        };
        post_json(&self.client, &endpoint(&self.base, "recommendations"), &body).await
    }
}

/// Remote free-form reasoning delegate.
#[derive(Clone)]
pub struct ReasoningClient {
    client: reqwest::Client,
    url: Url,
}

impl ReasoningClient {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            url,
        }
    }
}

#[derive(Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

/// Pull the reply text out of a reasoning response.
pub fn extract_reply_text(value: &serde_json::Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    REPLY_TEXT_FIELDS.iter().find_map(|field| {
        value
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

#[async_trait]
impl ReasoningDelegate for ReasoningClient {
    async fn reply(&self, prompt: &str) -> Result<String, UpstreamError> {
        let value: serde_json::Value =
            post_json(&self.client, self.url.as_str(), &PromptBody { prompt }).await?;
        extract_reply_text(&value)
            .ok_or_else(|| UpstreamError::Decode("reply text missing from response".to_string()))
    }
}
