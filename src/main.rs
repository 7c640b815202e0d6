//! mcpchat - chat with a language model that can call MCP tools
//!
#![doc = "mcpchat - chat with a language model that can call MCP tools"]
#![doc = "Main entry point for the mcpchat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpchat::cli::{Cli, Commands};
use mcpchat::commands;
use mcpchat::config::{Config, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.log_json);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { .. } => {
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Ask { prompt, .. } => {
            tracing::debug!("Using prompt: {}", prompt);
            commands::ask::run_ask(config, prompt).await?;
            Ok(())
        }
        Commands::Inspect => {
            commands::inspect::run_inspect(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so chat output on stdout stays clean.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "mcpchat=debug" } else { "mcpchat=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
