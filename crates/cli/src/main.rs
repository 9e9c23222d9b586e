//! groundchat CLI entry point.
//!
//! Commands:
//! - `ask`: Ask a question grounded in the search index
//! - `config`: Show, validate or locate the configuration
//! - `doctor`: Diagnose configuration and service health

use clap::{Parser, Subcommand};

mod commands;

use commands::ask::AskArgs;

#[derive(Parser)]
#[command(
    name = "groundchat",
    about = "groundchat: grounded chat over a search index",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question, optionally continuing an earlier conversation
    Ask(AskArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and service health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Load and validate the configuration
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay pipeable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
