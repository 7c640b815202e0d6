//! Command-line interface definition for mcpchat
//!
//! This module defines the CLI structure using clap's derive API:
//! an interactive chat, a one-shot question, and server inspection.

use clap::{Parser, Subcommand};

/// mcpchat - chat with a language model that can call MCP tools
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Override the provider from config (openai, ollama)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Override the model of the selected provider
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcpchat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Print model output as it is generated
        #[arg(long)]
        stream: bool,

        /// Maximum consecutive tool calls per message
        #[arg(long)]
        max_tool_rounds: Option<usize>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question
        prompt: String,

        /// Print model output as it is generated
        #[arg(long)]
        stream: bool,

        /// Maximum consecutive tool calls for this question
        #[arg(long)]
        max_tool_rounds: Option<usize>,
    },

    /// Connect to every configured server and list what it offers
    Inspect,
}

impl Commands {
    /// Streaming flag given on the command line, if the command has one.
    pub fn stream(&self) -> bool {
        match self {
            Commands::Chat { stream, .. } | Commands::Ask { stream, .. } => *stream,
            Commands::Inspect => false,
        }
    }

    pub fn max_tool_rounds(&self) -> Option<usize> {
        match self {
            Commands::Chat {
                max_tool_rounds, ..
            }
            | Commands::Ask {
                max_tool_rounds, ..
            } => *max_tool_rounds,
            Commands::Inspect => None,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            log_json: false,
            provider: None,
            model: None,
            command: Commands::Inspect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Inspect));
    }

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["mcpchat", "chat"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Chat {
                stream: false,
                max_tool_rounds: None
            }
        ));
    }

    #[test]
    fn test_cli_parse_chat_with_options() {
        let cli =
            Cli::try_parse_from(["mcpchat", "chat", "--stream", "--max-tool-rounds", "3"]).unwrap();
        assert!(cli.command.stream());
        assert_eq!(cli.command.max_tool_rounds(), Some(3));
    }

    #[test]
    fn test_cli_parse_ask() {
        let cli = Cli::try_parse_from(["mcpchat", "ask", "what is 2 + 100?"]).unwrap();
        match cli.command {
            Commands::Ask { prompt, .. } => assert_eq!(prompt, "what is 2 + 100?"),
            other => panic!("expected ask, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_ask_requires_prompt() {
        assert!(Cli::try_parse_from(["mcpchat", "ask"]).is_err());
    }

    #[test]
    fn test_cli_parse_inspect() {
        let cli = Cli::try_parse_from(["mcpchat", "inspect"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect));
        assert!(!cli.command.stream());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcpchat",
            "chat",
            "--verbose",
            "--log-json",
            "--provider",
            "ollama",
            "--model",
            "qwen2.5",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert_eq!(cli.provider.as_deref(), Some("ollama"));
        assert_eq!(cli.model.as_deref(), Some("qwen2.5"));
    }

    #[test]
    fn test_cli_custom_config_path() {
        let cli = Cli::try_parse_from(["mcpchat", "--config", "my.yaml", "inspect"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("my.yaml"));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["mcpchat"]).is_err());
    }
}
