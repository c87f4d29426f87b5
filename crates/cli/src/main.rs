//! Banter CLI: the main entry point.
//!
//! Commands:
//! - `generate`: Generate a character's next message from a request file
//! - `doctor`: Check configuration and provider setup without network calls
//! - `config`: Print the default configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "banter",
    about = "Banter — AI character responses for group chats",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.banter/config.toml)
    #[arg(short, long, global = true, env = "BANTER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the next message for a request
    Generate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Diagnose configuration and provider setup
    Doctor,

    /// Print the default configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref());
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    logging::init(&logging, cli.verbose);

    match cli.command {
        Commands::Generate { input, pretty } => commands::generate::run(config, &input, pretty).await,
        Commands::Doctor => commands::doctor::run(cli.config.as_deref(), config).await,
        Commands::Config { path } => commands::config_cmd::run(path),
    }
}
