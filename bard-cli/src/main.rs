//! Main entry point for the Bard CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{HttpGateway, QueryCache, SessionController, SessionSettings};
use dotenv::dotenv;
use shared::config::{ClientConfig, ConfigOverrides};
use std::{path::PathBuf, sync::Arc};

mod commands;
mod render;
mod tracer;

/// Bard CLI
#[derive(Parser)]
#[command(name = "bard", version)]
#[command(
    about = "Terminal client for streaming chat with a language-model backend",
    long_about = None
)]
struct Cli {
    /// Path to a configuration file (.yaml, .yml, .json, or .toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (e.g., <http://localhost:8000>)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Name shown on your messages and used as the thread owner
    #[arg(long, short, global = true)]
    username: Option<String>,

    /// Model to generate replies with (e.g., gemma3:1b)
    #[arg(long, short, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the Bard CLI
#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Open an existing thread instead of starting a new one
        #[arg(long)]
        session: Option<String>,
    },

    /// List your threads
    Threads,

    /// List the models the backend can use
    Models,

    /// Print the messages of a thread
    History {
        /// Thread identifier (a UUIDv4)
        session_id: String,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell to generate the completion script for (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },

    /// Generate a configuration file with the default settings
    Config {
        /// Format of the configuration file (yaml, json, or toml)
        #[arg(long, short, default_value = "yaml")]
        format: String,

        /// Where to write the file. Defaults to `bard.<format>` in the current directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        backend_url: cli.server,
        username: cli.username,
        default_model: cli.model,
    };

    match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            return Ok(());
        }
        Commands::Config { format, output } => {
            return commands::config::generate_config(&format, output.as_deref());
        }
        _ => {}
    }

    let config = ClientConfig::load_config(cli.config.as_deref(), &overrides)
        .context("failed to load configuration")?;
    tracer::initialize_tracing(&config.logging).context("failed to initialise logging")?;

    let gateway = HttpGateway::from_config(&config).context("invalid backend URL")?;
    let controller = SessionController::new(
        Arc::new(gateway),
        Arc::new(QueryCache::new()),
        SessionSettings::from_config(&config),
    );

    match cli.command {
        Commands::Chat { session } => {
            commands::chat::run_chat(&controller, &config, session.as_deref()).await
        }
        Commands::Threads => commands::threads::list_threads(&controller).await,
        Commands::Models => {
            commands::models::list_models(&controller, &config.default_model).await
        }
        Commands::History { session_id } => {
            commands::history::print_history(&controller, &session_id).await
        }
        Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}
