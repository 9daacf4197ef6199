//! taskloop CLI, the main entry point.
//!
//! Commands:
//! - `chat`    Interactive multi-turn chat
//! - `ask`     Send a single message and print the answer
//! - `memory`  Save to or search long-term memory directly
//! - `config`  Write or validate the configuration file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "taskloop",
    about = "taskloop: a tool-calling agent with long-term memory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Embed locally with the feature-hashing embedder instead of the remote service
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent interactively
    Chat,

    /// Send a single message
    Ask {
        #[arg(short, long)]
        message: String,
    },

    /// Long-term memory commands
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Save content as a new memory
    Save { content: String },

    /// Show the memories most similar to a query
    Search {
        query: String,

        /// Number of results (defaults to memory.retrieve_limit)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show backend and record count
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,

    /// Validate the config file and check the provider
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat => commands::agent::chat(cli.offline).await?,
        Commands::Ask { message } => commands::agent::ask(&message, cli.offline).await?,
        Commands::Memory { action } => match action {
            MemoryAction::Save { content } => commands::memory::save(&content, cli.offline).await?,
            MemoryAction::Search { query, k } => {
                commands::memory::search(&query, k, cli.offline).await?
            }
            MemoryAction::Stats => commands::memory::stats(cli.offline).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init()?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
