//! lmgram CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Create the config directory, default config and users file
//! - `run`: Start the bot (long polling or webhook)
//! - `models`: List models served by the inference server
//! - `users`: Manage the allow-list
//! - `logs`: Show the request log, newest first

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lmgram_config::{AppConfig, ResponseMode};

mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "lmgram",
    about = "lmgram: Telegram bot relay for LM Studio",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.toml
    #[arg(long, global = true, env = "LMGRAM_CONFIG", default_value_os_t = AppConfig::default_path())]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, users file and locale catalogs
    Onboard,

    /// Start the bot
    Run {
        /// Override the model from the config
        #[arg(short, long)]
        model: Option<String>,

        /// Override the response mode (stream or full)
        #[arg(long)]
        mode: Option<ResponseMode>,
    },

    /// List models available on the inference server
    Models,

    /// Manage who may talk to the bot
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Print the request log, newest first
    Logs {
        /// Maximum number of entries to print
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// List every known user
    List,
    /// Allow a user by Telegram id
    Allow { id: i64 },
    /// Revoke a user's access by Telegram id
    Deny { id: i64 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // `run` installs its own JSON subscriber that also writes the log file.
    if !matches!(cli.command, Commands::Run { .. }) {
        logging::init_console(cli.verbose);
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run(&cli.config)?,
        Commands::Run { model, mode } => {
            commands::run::run(&cli.config, cli.verbose, model, mode).await?
        }
        Commands::Models => commands::models::run(&cli.config).await?,
        Commands::Users { action } => match action {
            UsersAction::List => commands::users::list(&cli.config)?,
            UsersAction::Allow { id } => commands::users::set(&cli.config, id, true)?,
            UsersAction::Deny { id } => commands::users::set(&cli.config, id, false)?,
        },
        Commands::Logs { limit } => commands::logs::run(&cli.config, limit)?,
    }

    Ok(())
}
