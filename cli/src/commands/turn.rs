use std::path::PathBuf;

use clap::Args;
use concierge_core::UiAction;
use serde_json::json;

use crate::engine::{Engine, describe, render};
use crate::util::{clear_session, exit_error, load_session, save_session, session_path};

#[derive(Args)]
pub struct TurnArgs {
    /// Customer message for this turn
    pub message: Option<String>,

    /// Click an upgrade button by option id
    #[arg(long)]
    pub select: Option<String>,

    /// Forget the stored session before this turn
    #[arg(long)]
    pub reset: bool,

    /// Session file (default: <config dir>/concierge/session.json)
    #[arg(long, env = "CONCIERGE_SESSION_FILE")]
    pub session: Option<PathBuf>,

    /// Send the turn to the API instead of the in-process reference services
    #[arg(long)]
    pub remote: bool,

    /// JSON ticket records for the local registry (defaults to the demo ticket)
    #[arg(long, env = "CONCIERGE_TICKETS_FILE", conflicts_with = "remote")]
    pub tickets_file: Option<PathBuf>,

    /// Print the reply as JSON
    #[arg(long)]
    pub json: bool,

    /// Print intent, state and reply source (local turns only)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// The text sent for the turn; a bare `--select` sends the option id.
fn turn_message(message: Option<&str>, select: Option<&str>) -> Option<String> {
    match (message.map(str::trim).filter(|m| !m.is_empty()), select) {
        (Some(message), _) => Some(message.to_string()),
        (None, Some(option_id)) => Some(option_id.trim().to_string()),
        (None, None) => None,
    }
}

pub async fn run(api_url: &str, args: TurnArgs) -> i32 {
    let path = args.session.clone().unwrap_or_else(session_path);

    if args.reset {
        if let Err(e) = clear_session(&path) {
            exit_error(&format!("Failed to clear session: {e}"), None);
        }
        tracing::debug!(path = %path.display(), "session cleared");
    }

    let Some(message) = turn_message(args.message.as_deref(), args.select.as_deref()) else {
        if args.reset {
            return 0;
        }
        exit_error(
            "A message or --select is required",
            Some("e.g. concierge turn \"I want to upgrade my ticket\""),
        );
    };

    let engine = if args.remote {
        Engine::remote(api_url)
    } else {
        match Engine::local(args.tickets_file.as_deref()) {
            Ok(engine) => engine,
            Err(e) => exit_error(&e, Some("Check --tickets-file / CONCIERGE_TICKETS_FILE.")),
        }
    };

    let action = args.select.map(|option_id| UiAction::UpgradeSelected {
        option_id: option_id.trim().to_string(),
    });
    let ctx = load_session(&path);

    let reply = match engine.turn(&message, ctx, action.as_ref()).await {
        Ok(reply) => reply,
        Err(e) => exit_error(&e, Some("Is the API server running? Check CONCIERGE_API_URL.")),
    };

    if let Err(e) = save_session(&path, &reply.context) {
        exit_error(&format!("Failed to save session: {e}"), None);
    }

    if args.json {
        let mut out = json!({
            "response": reply.envelope.text,
            "showUpgradeButtons": reply.envelope.show_upgrade_buttons,
            "upgradeOptions": reply.envelope.upgrade_options,
            "state": reply.context.state,
        });
        if let Some(outcome) = reply.outcome.as_ref().filter(|_| args.verbose) {
            out["intent"] = json!(outcome.intent);
            out["replySource"] = json!(outcome.reply_source.as_str());
        }
        println!("{out:#}");
    } else {
        println!("{}", render(&reply.envelope));
        if args.verbose {
            if let Some(outcome) = &reply.outcome {
                eprintln!("{}", describe(outcome));
            }
        }
    }
    0
}
