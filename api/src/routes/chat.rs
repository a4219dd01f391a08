use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use concierge_core::error::ApiError;
use concierge_core::{SessionContext, Turn, UiAction, UpgradeOption};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 2000;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/chat", post(chat))
}

/// One chat turn from the web client.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Context returned by the previous turn; omit on the first turn
    #[serde(default)]
    pub context: Option<SessionContext>,
    /// Seeds `context.turns` when the context carries none
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    /// Structured UI action, e.g. an upgrade button click
    #[serde(default)]
    pub action: Option<UiAction>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub show_upgrade_buttons: bool,
    pub upgrade_options: Vec<UpgradeOption>,
    /// Pass back unchanged on the next turn
    pub context: SessionContext,
}

fn validate_message(message: &str) -> Result<(), AppError> {
    if message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be empty".to_string(),
            field: Some("message".to_string()),
            received: Some(serde_json::Value::String(message.to_string())),
            docs_hint: Some("Send the customer's text in `message`.".to_string()),
        });
    }
    let chars = message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation {
            message: format!("message is {chars} characters; the limit is {MAX_MESSAGE_CHARS}"),
            field: Some("message".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(())
}

/// Handle one conversational turn
///
/// Stateless: the caller supplies the session context and stores the one
/// returned. Upgrade buttons are only returned for a validated ticket.
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply and updated context", body = ChatResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    validate_message(&req.message)?;

    let mut context = req.context.unwrap_or_default();
    if context.turns.is_empty() {
        context.turns = req.conversation_history;
    }

    let outcome = state
        .orchestrator
        .run_turn(&req.message, context, req.action.as_ref())
        .await;

    Ok(Json(ChatResponse {
        success: true,
        response: outcome.envelope.text,
        show_upgrade_buttons: outcome.envelope.show_upgrade_buttons,
        upgrade_options: outcome.envelope.upgrade_options,
        context: outcome.context,
    }))
}
