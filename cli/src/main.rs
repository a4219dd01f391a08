use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod engine;
mod util;

#[derive(Parser)]
#[command(
    name = "concierge",
    version,
    about = "Concierge CLI: chat with the ticket-upgrade assistant locally or through the API"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "CONCIERGE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health {
        /// Skip pretty-printing (raw JSON for piping)
        #[arg(long)]
        raw: bool,
    },
    /// Interactive conversation (in-process unless --remote)
    Chat(commands::chat::ChatArgs),
    /// Run a single turn, keeping the session context on disk between calls
    Turn(commands::turn::TurnArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CONCIERGE_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Health { raw } => commands::health::run(&cli.api_url, raw).await,
        Commands::Chat(args) => commands::chat::run(&cli.api_url, args).await,
        Commands::Turn(args) => commands::turn::run(&cli.api_url, args).await,
    };

    std::process::exit(code);
}
