use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Args;
use concierge_core::{SessionContext, UiAction};

use crate::engine::{Engine, describe, render};
use crate::util::exit_error;

#[derive(Args)]
pub struct ChatArgs {
    /// Send turns to the API instead of the in-process reference services
    #[arg(long)]
    pub remote: bool,

    /// JSON ticket records for the local registry (defaults to the demo ticket)
    #[arg(long, env = "CONCIERGE_TICKETS_FILE", conflicts_with = "remote")]
    pub tickets_file: Option<PathBuf>,

    /// Print intent, state and reply source after each local turn
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

const HELP: &str = "Commands: /select <n|id>  /context  /reset  /quit";

#[derive(Debug, PartialEq, Eq)]
enum ReplInput {
    Message(String),
    Select(String),
    Context,
    Reset,
    Quit,
    Help,
    Empty,
}

fn parse_input(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplInput::Message(line.to_string());
    };
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((command, ""));
    match name {
        "select" if !arg.is_empty() => ReplInput::Select(arg.to_string()),
        "context" => ReplInput::Context,
        "reset" => ReplInput::Reset,
        "quit" | "exit" => ReplInput::Quit,
        _ => ReplInput::Help,
    }
}

/// Option id for `/select`: a 1-based position in the disclosed list, or an id.
fn resolve_selection(arg: &str, ctx: &SessionContext) -> String {
    arg.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| ctx.upgrade_options.get(index))
        .map(|option| option.id.clone())
        .unwrap_or_else(|| arg.to_string())
}

pub async fn run(api_url: &str, args: ChatArgs) -> i32 {
    let engine = if args.remote {
        Engine::remote(api_url)
    } else {
        match Engine::local(args.tickets_file.as_deref()) {
            Ok(engine) => engine,
            Err(e) => exit_error(&e, Some("Check --tickets-file / CONCIERGE_TICKETS_FILE.")),
        }
    };

    println!("Ticket upgrade assistant. {HELP}");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut ctx = SessionContext::default();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };

        let (message, action) = match parse_input(&line) {
            ReplInput::Empty => continue,
            ReplInput::Quit => break,
            ReplInput::Help => {
                println!("{HELP}");
                continue;
            }
            ReplInput::Reset => {
                ctx = SessionContext::default();
                println!("(session cleared)");
                continue;
            }
            ReplInput::Context => {
                match serde_json::to_string_pretty(&ctx) {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("{e}"),
                }
                continue;
            }
            ReplInput::Select(arg) => {
                let option_id = resolve_selection(&arg, &ctx);
                (option_id.clone(), Some(UiAction::UpgradeSelected { option_id }))
            }
            ReplInput::Message(text) => (text, None),
        };

        match engine.turn(&message, ctx.clone(), action.as_ref()).await {
            Ok(reply) => {
                println!("{}", render(&reply.envelope));
                if args.verbose {
                    if let Some(outcome) = &reply.outcome {
                        eprintln!("  {}", describe(outcome));
                    }
                }
                ctx = reply.context;
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    0
}
