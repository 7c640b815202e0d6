//! Configuration management for mcpchat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{McpChatError, Result};
use crate::mcp::config::ServerConfig;
use crate::providers::PROVIDER_TYPES;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Upper bound accepted for `chat.max_tool_rounds`
pub const MAX_TOOL_ROUNDS_LIMIT: usize = 100;

/// Main configuration structure for mcpchat
///
/// Holds the MCP servers to connect to, the inference backend, and the
/// behaviour of the chat loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// MCP servers whose tools are offered to the model
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,

    /// Inference backend configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chat loop settings
    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::default()]
}

/// Provider configuration
///
/// Specifies which inference backend to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// OpenAI-compatible server configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_provider_type() -> String {
    "openai".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Model name of the selected provider
    pub fn model(&self) -> &str {
        match self.provider_type.as_str() {
            "ollama" => &self.ollama.model,
            _ => &self.openai.model,
        }
    }

    fn set_model(&mut self, model: String) {
        match self.provider_type.as_str() {
            "ollama" => self.ollama.model = model,
            _ => self.openai.model = model,
        }
    }
}

/// OpenAI-compatible chat completions server (LM Studio, vLLM, OpenAI)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAiConfig {
    /// Base URL including the API version segment, e.g. `http://localhost:1234/v1`
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Bearer token; local servers usually need none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature used when a call does not override it
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on one inference request
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_openai_model() -> String {
    "local-model".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_model_timeout() -> u64 {
    120
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,

    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Sampling temperature; the model's own default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            timeout_seconds: default_model_timeout(),
            temperature: None,
        }
    }
}

/// Chat loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Consecutive tool calls allowed for one user message
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Stream model output as it is generated
    #[serde(default)]
    pub stream: bool,

    /// Inputs that end an interactive session (case-insensitive)
    #[serde(default = "default_exit_commands")]
    pub exit_commands: Vec<String>,

    /// Custom system prompt template; may contain `{tools_description}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Temperature for the first model call of each message, where the model
    /// decides whether to call a tool
    #[serde(default = "default_tool_temperature")]
    pub tool_temperature: Option<f32>,
}

fn default_max_tool_rounds() -> usize {
    5
}

fn default_exit_commands() -> Vec<String> {
    vec!["quit".to_string(), "exit".to_string(), "stop".to_string()]
}

fn default_tool_temperature() -> Option<f32> {
    Some(0.1)
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            stream: false,
            exit_commands: default_exit_commands(),
            system_prompt: None,
            tool_temperature: default_tool_temperature(),
        }
    }
}

impl ChatConfig {
    /// Whether `input` is one of the exit keywords.
    pub fn is_exit_command(&self, input: &str) -> bool {
        let input = input.trim();
        self.exit_commands
            .iter()
            .any(|cmd| cmd.eq_ignore_ascii_case(input))
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McpChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| McpChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Server override replaces the URL of the first server
        if let Ok(url) = std::env::var("MCPCHAT_SERVER_URL") {
            match self.servers.first_mut() {
                Some(server) => server.url = url.clone(),
                None => self.servers.push(ServerConfig {
                    url: url.clone(),
                    ..ServerConfig::default()
                }),
            }
            tracing::debug!(url = %url, "Env override: MCPCHAT_SERVER_URL");
        }

        // Provider overrides
        if let Ok(provider_type) = std::env::var("MCPCHAT_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(model) = std::env::var("MCPCHAT_MODEL") {
            self.provider.set_model(model);
        }

        if let Ok(base_url) = std::env::var("MCPCHAT_BASE_URL") {
            match self.provider.provider_type.as_str() {
                "ollama" => self.provider.ollama.host = base_url,
                _ => self.provider.openai.base_url = base_url,
            }
        }

        if let Ok(api_key) = std::env::var("MCPCHAT_API_KEY") {
            self.provider.openai.api_key = Some(api_key);
        }

        // Chat overrides
        if let Ok(rounds) = std::env::var("MCPCHAT_MAX_TOOL_ROUNDS") {
            if let Ok(value) = rounds.parse() {
                self.chat.max_tool_rounds = value;
            } else {
                tracing::warn!("Invalid MCPCHAT_MAX_TOOL_ROUNDS: {}", rounds);
            }
        }

        if let Ok(stream) = std::env::var("MCPCHAT_STREAM") {
            match stream.parse::<bool>() {
                Ok(v) => {
                    self.chat.stream = v;
                    tracing::debug!(stream = v, "Env override: MCPCHAT_STREAM");
                }
                Err(_) => tracing::warn!("Invalid value for MCPCHAT_STREAM: {}", stream),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(provider) = &cli.provider {
            tracing::debug!("Using provider override: {}", provider);
            self.provider.provider_type = provider.clone();
        }

        if let Some(model) = &cli.model {
            tracing::debug!("Using model override: {}", model);
            self.provider.set_model(model.clone());
        }

        if cli.command.stream() {
            self.chat.stream = true;
        }

        if let Some(rounds) = cli.command.max_tool_rounds() {
            self.chat.max_tool_rounds = rounds;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`McpChatError::Config`] describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(
                McpChatError::Config("at least one MCP server must be configured".to_string())
                    .into(),
            );
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(McpChatError::Config(format!(
                    "duplicate server name: {}",
                    server.name
                ))
                .into());
            }
        }

        if self.provider.provider_type.is_empty() {
            return Err(McpChatError::Config("Provider type cannot be empty".to_string()).into());
        }

        if !PROVIDER_TYPES.contains(&self.provider.provider_type.as_str()) {
            return Err(McpChatError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                PROVIDER_TYPES.join(", ")
            ))
            .into());
        }

        if !(0.0..=2.0).contains(&self.provider.openai.temperature) {
            return Err(McpChatError::Config(
                "openai.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if let Some(t) = self.provider.ollama.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(McpChatError::Config(
                    "ollama.temperature must be between 0.0 and 2.0".to_string(),
                )
                .into());
            }
        }

        if self.provider.openai.max_tokens == 0 {
            return Err(McpChatError::Config(
                "openai.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.provider.openai.timeout_seconds == 0 || self.provider.ollama.timeout_seconds == 0
        {
            return Err(McpChatError::Config(
                "provider timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.max_tool_rounds == 0 {
            return Err(McpChatError::Config(
                "max_tool_rounds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.max_tool_rounds > MAX_TOOL_ROUNDS_LIMIT {
            return Err(McpChatError::Config(format!(
                "max_tool_rounds must be less than or equal to {}",
                MAX_TOOL_ROUNDS_LIMIT
            ))
            .into());
        }

        if let Some(t) = self.chat.tool_temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(McpChatError::Config(
                    "chat.tool_temperature must be between 0.0 and 2.0".to_string(),
                )
                .into());
            }
        }

        if self.chat.exit_commands.iter().all(|c| c.trim().is_empty()) {
            return Err(McpChatError::Config(
                "chat.exit_commands must contain at least one command".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            provider: ProviderConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}
