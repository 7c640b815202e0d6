//! mcpchat - chat with a language model that can call MCP tools
//!
//! This library connects an inference backend to one or more Model Context
//! Protocol servers and runs the conversation loop that lets the model use
//! the servers' tools.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: transports, JSON-RPC correlation, typed MCP methods and the
//!   lifecycle-managed `McpSession`
//! - `providers`: inference backend abstraction (OpenAI-compatible, Ollama)
//! - `agent`: conversation history, tool-request parsing and the controller
//! - `prompts`: system prompt construction from the tool catalogue
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface and its handlers
//!
//! # Example
//!
//! ```no_run
//! use mcpchat::{Agent, Config};
//! use mcpchat::providers::create_provider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let provider = create_provider(&config.provider)?;
//!     let mut agent = Agent::connect(&config, provider.into()).await?;
//!     let answer = agent.respond("What tools do you have?").await;
//!     agent.shutdown().await;
//!     println!("{}", answer?);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prompts;
pub mod providers;
pub mod sse;

// Re-export commonly used types
pub use agent::Agent;
pub use config::Config;
pub use error::{McpChatError, Result};
pub use mcp::{McpSession, SessionState};
