//! Typed MCP requests over [`RpcClient`]
//!
//! [`McpProtocol`] maps each MCP method to one typed async call. Listing
//! methods follow `nextCursor` until the server stops returning one, so
//! callers always see the complete collection in server order. Errors are
//! returned as produced by the JSON-RPC layer; classifying them into
//! session-level kinds is [`crate::mcp::session`]'s job.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::error::{McpChatError, Result};
use crate::mcp::client::RpcClient;
use crate::mcp::types::{
    CallToolParams, CallToolResult, ClientCapabilities, GetPromptParams, GetPromptResult,
    Implementation, InitializeParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Page, PaginatedParams,
    PromptDescriptor, ReadResourceParams, ReadResourceResult, ResourceDescriptor,
    ResourceTemplate, ToolDescriptor, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_PING, METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST,
    METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ, METHOD_RESOURCES_TEMPLATES_LIST,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Upper bound on pages followed by one listing call.
const MAX_PAGES: usize = 100;

/// Typed MCP method surface bound to one connection.
#[derive(Debug, Clone)]
pub struct McpProtocol {
    client: RpcClient,
    request_timeout: Duration,
}

impl McpProtocol {
    pub fn new(client: RpcClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Run the `initialize` / `notifications/initialized` handshake.
    ///
    /// # Errors
    ///
    /// [`McpChatError::Protocol`] if the server picks a protocol revision
    /// outside [`SUPPORTED_PROTOCOL_VERSIONS`] or its reply cannot be
    /// decoded; otherwise whatever the request itself failed with.
    pub async fn handshake(&self, client_info: Implementation) -> Result<InitializeResult> {
        let reply: InitializeResult = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: ClientCapabilities::default(),
                    client_info,
                },
                Some(self.request_timeout),
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&reply.protocol_version.as_str()) {
            return Err(McpChatError::Protocol(format!(
                "server selected unsupported protocol version '{}' (supported: {})",
                reply.protocol_version,
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            ))
            .into());
        }

        self.client
            .notify(METHOD_INITIALIZED, serde_json::json!({}))?;
        Ok(reply)
    }

    async fn list_all<P: Page>(&self, method: &str) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page: P = self
                .client
                .request(method, PaginatedParams { cursor }, Some(self.request_timeout))
                .await?;
            let (page_items, next) = page.into_parts();
            items.extend(page_items);

            match next {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => return Ok(items),
            }
        }

        Err(McpChatError::Protocol(format!(
            "'{method}' still paginating after {MAX_PAGES} pages"
        ))
        .into())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.list_all::<ListToolsResult>(METHOD_TOOLS_LIST).await
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.list_all::<ListResourcesResult>(METHOD_RESOURCES_LIST)
            .await
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.list_all::<ListResourceTemplatesResult>(METHOD_RESOURCES_TEMPLATES_LIST)
            .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.list_all::<ListPromptsResult>(METHOD_PROMPTS_LIST).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.client
            .request(
                METHOD_TOOLS_CALL,
                CallToolParams {
                    name: name.to_string(),
                    arguments: Some(arguments),
                },
                Some(self.request_timeout),
            )
            .await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.client
            .request(
                METHOD_RESOURCES_READ,
                ReadResourceParams {
                    uri: uri.to_string(),
                },
                Some(self.request_timeout),
            )
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.client
            .request(
                METHOD_PROMPTS_GET,
                GetPromptParams {
                    name: name.to_string(),
                    arguments,
                },
                Some(self.request_timeout),
            )
            .await
    }

    pub async fn ping(&self) -> Result<()> {
        let _: Value = self
            .client
            .request(METHOD_PING, serde_json::json!({}), Some(self.request_timeout))
            .await?;
        Ok(())
    }
}
