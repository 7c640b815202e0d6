//! Shared helpers for integration tests
//!
//! A wiremock server standing in for a Streamable HTTP MCP server that
//! offers one `add` tool, and helpers for OpenAI-style replies.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpchat::mcp::types::LATEST_PROTOCOL_VERSION;

pub const MCP_PATH: &str = "/mcp";
pub const SESSION_ID: &str = "session-abc";

/// Request ids assigned by the client: the handshake is request 1, the
/// first listing request 2, and the next request (a tool call, or the
/// `inspect` ping) request 3.
pub const INITIALIZE_ID: u64 = 1;
pub const TOOLS_LIST_ID: u64 = 2;
pub const TOOLS_CALL_ID: u64 = 3;
pub const PING_ID: u64 = 3;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

fn rpc_result(id: u64, result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Mcp-Session-Id", SESSION_ID)
        .set_body_json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

/// Mount a calculator MCP server answering `initialize`, `tools/list`,
/// `ping` and one `tools/call` of `add` with `result_text`.
#[allow(dead_code)]
pub async fn mount_calculator(server: &MockServer, result_text: &str) {
    Mock::given(method("POST"))
        .and(path(MCP_PATH))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(rpc_result(
            INITIALIZE_ID,
            json!({
                "protocolVersion": LATEST_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "calculator", "version": "1.0.0" }
            }),
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(MCP_PATH))
        .and(body_partial_json(
            json!({ "method": "notifications/initialized" }),
        ))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(MCP_PATH))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(rpc_result(
            TOOLS_LIST_ID,
            json!({
                "tools": [{
                    "name": "add",
                    "description": "Add two numbers",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "a": { "type": "integer", "description": "first addend" },
                            "b": { "type": "integer", "description": "second addend" }
                        },
                        "required": ["a", "b"]
                    }
                }]
            }),
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(MCP_PATH))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": { "name": "add" }
        })))
        .respond_with(rpc_result(
            TOOLS_CALL_ID,
            json!({ "content": [{ "type": "text", "text": result_text }] }),
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(MCP_PATH))
        .and(body_partial_json(json!({ "method": "ping" })))
        .respond_with(rpc_result(PING_ID, json!({})))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(MCP_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// A non-streaming chat completion reply.
#[allow(dead_code)]
pub fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

/// A streaming chat completion reply delivering `fragments` in order.
#[allow(dead_code)]
pub fn streamed_completion(fragments: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = json!({ "choices": [{ "delta": { "content": fragment } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream")
}

/// Config YAML pointing at the given MCP and inference mock servers.
#[allow(dead_code)]
pub fn config_yaml(mcp_uri: &str, model_uri: &str) -> String {
    format!(
        r#"
servers:
  - name: calculator
    url: {mcp_uri}{MCP_PATH}
    transport: http
    connect_timeout_seconds: 5
    request_timeout_seconds: 5

provider:
  type: openai
  openai:
    base_url: {model_uri}/v1
    model: test-model
    timeout_seconds: 5

chat:
  max_tool_rounds: 3
"#
    )
}
