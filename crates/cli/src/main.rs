//! oxpilot CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat with the assistant
//! - `code`    — Goal-directed agent mode with accept/reject review
//! - `config`  — Show or initialize the configuration
//! - `models`  — List models available on the configured provider

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "oxpilot",
    about = "oxpilot — an AI coding assistant for your terminal",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Work on a goal in agent mode (propose, review, accept/reject)
    Code {
        /// The goal to work towards
        goal: String,

        /// Workspace directory (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<String>,
    },

    /// Show or initialize the configuration
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },

    /// List models available on the configured provider
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Code { goal, workspace } => commands::code::run(&goal, workspace).await?,
        Commands::Config { action } => commands::config_cmd::run(action)?,
        Commands::Models => commands::models::run().await?,
    }

    Ok(())
}
