//! Provider module
//!
//! This module contains the inference backend abstraction and its
//! implementations for OpenAI-compatible servers and Ollama.

pub mod base;
pub mod ollama;
pub mod openai;

pub use base::{collect_stream, ChatOptions, Message, Provider, TextStream};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::{McpChatError, Result};

/// Provider types accepted in `provider.type`.
pub const PROVIDER_TYPES: [&str; 2] = ["openai", "ollama"];

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns [`McpChatError::Config`] for an unknown provider type, or the
/// provider's own construction error.
///
/// # Examples
///
/// ```
/// use mcpchat::config::ProviderConfig;
/// use mcpchat::providers::create_provider;
///
/// let provider = create_provider(&ProviderConfig::default()).unwrap();
/// assert_eq!(provider.name(), "openai");
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    match config.provider_type.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config.openai.clone())?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config.ollama.clone())?)),
        other => Err(McpChatError::Config(format!(
            "Unknown provider type: {}. Must be one of: {}",
            other,
            PROVIDER_TYPES.join(", ")
        ))
        .into()),
    }
}

/// A one-shot HTTP server whose response body stalls after its first chunk.
#[cfg(test)]
pub(crate) async fn stalled_body_server(content_type: &'static str, first_chunk: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = vec![0u8; 64 * 1024];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{first_chunk}\r\n",
            first_chunk.len()
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.flush().await;
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });
    format!("http://{addr}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_provider() {
        let config = ProviderConfig {
            provider_type: "ollama".to_string(),
            ..ProviderConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_create_unknown_provider_fails() {
        let config = ProviderConfig {
            provider_type: "gemini".to_string(),
            ..ProviderConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider type"));
    }
}
