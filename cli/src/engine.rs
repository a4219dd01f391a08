//! Where a CLI turn is handled: in-process against the reference services,
//! or remotely through the API's `/v1/chat`.

use std::path::Path;

use concierge_core::reference::TicketRegistry;
use concierge_core::{
    DelegateSettings, Orchestrator, ResponseEnvelope, SessionContext, TurnOutcome, UiAction,
    UpgradeOption,
};
use serde::Deserialize;
use serde_json::json;

use crate::util::post_json;

pub enum Engine {
    Local(Orchestrator),
    Remote { api_url: String },
}

/// Result of one turn; `outcome` is only available for local turns.
pub struct TurnReply {
    pub envelope: ResponseEnvelope,
    pub context: SessionContext,
    pub outcome: Option<TurnOutcome>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteChatResponse {
    response: String,
    #[serde(default)]
    show_upgrade_buttons: bool,
    #[serde(default)]
    upgrade_options: Vec<UpgradeOption>,
    context: SessionContext,
}

impl Engine {
    pub fn local(tickets_file: Option<&Path>) -> Result<Self, String> {
        let registry = match tickets_file {
            Some(path) => TicketRegistry::from_path(path).map_err(|e| e.to_string())?,
            None => TicketRegistry::demo(),
        };
        tracing::debug!(tickets = registry.len(), "local engine ready");
        Ok(Self::Local(Orchestrator::reference(
            registry,
            DelegateSettings::default(),
        )))
    }

    pub fn remote(api_url: &str) -> Self {
        Self::Remote {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn turn(
        &self,
        message: &str,
        context: SessionContext,
        action: Option<&UiAction>,
    ) -> Result<TurnReply, String> {
        match self {
            Self::Local(orchestrator) => {
                let outcome = orchestrator.run_turn(message, context, action).await;
                Ok(TurnReply {
                    envelope: outcome.envelope.clone(),
                    context: outcome.context.clone(),
                    outcome: Some(outcome),
                })
            }
            Self::Remote { api_url } => {
                let body = json!({
                    "message": message,
                    "context": context,
                    "action": action,
                });
                let (status, body) = post_json(api_url, "/v1/chat", &body).await?;
                if !(200..300).contains(&status) {
                    let detail = body["message"].as_str().unwrap_or("request failed");
                    return Err(format!("API returned {status}: {detail}"));
                }
                let reply: RemoteChatResponse = serde_json::from_value(body)
                    .map_err(|e| format!("Unexpected chat response: {e}"))?;
                Ok(TurnReply {
                    envelope: ResponseEnvelope {
                        text: reply.response,
                        show_upgrade_buttons: reply.show_upgrade_buttons,
                        upgrade_options: reply.upgrade_options,
                    },
                    context: reply.context,
                    outcome: None,
                })
            }
        }
    }
}

/// Human-readable rendering of a reply, options numbered for `/select`.
pub fn render(envelope: &ResponseEnvelope) -> String {
    let mut out = envelope.text.clone();
    if envelope.show_upgrade_buttons {
        for (index, option) in envelope.upgrade_options.iter().enumerate() {
            out.push_str(&format!(
                "\n  [{}] {} ({}) ${}",
                index + 1,
                option.name,
                option.id,
                option.price.normalize()
            ));
        }
    }
    out
}

/// One-line turn diagnostics for `--verbose`.
pub fn describe(outcome: &TurnOutcome) -> String {
    let issues: Vec<&str> = outcome.issues.iter().map(|issue| issue.kind()).collect();
    format!(
        "intent={} state={} source={} issues=[{}]",
        outcome.intent.as_str(),
        outcome.state.as_str(),
        outcome.reply_source.as_str(),
        issues.join(",")
    )
}
