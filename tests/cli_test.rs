//! Binary-level tests for the `mcpchat` command

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer};

use common::{completion, config_yaml, mount_calculator, temp_config_file};

fn mcpchat() -> Command {
    let mut cmd = Command::cargo_bin("mcpchat").expect("binary built");
    for var in [
        "MCPCHAT_SERVER_URL",
        "MCPCHAT_PROVIDER",
        "MCPCHAT_MODEL",
        "MCPCHAT_BASE_URL",
        "MCPCHAT_API_KEY",
        "MCPCHAT_MAX_TOOL_ROUNDS",
        "MCPCHAT_STREAM",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    mcpchat()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn test_ask_requires_prompt() {
    mcpchat().arg("ask").assert().failure();
}

#[test]
fn test_invalid_config_file_is_reported() {
    let (_dir, config) = temp_config_file("servers: [unterminated");
    mcpchat()
        .arg("--config")
        .arg(&config)
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_provider_rejected_before_connecting() {
    let (_dir, config) = temp_config_file("provider:\n  type: gemini\n");
    mcpchat()
        .arg("--config")
        .arg(&config)
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid provider type"));
}

#[test]
fn test_inspect_unreachable_server_fails() {
    let (_dir, config) = temp_config_file(
        "servers:\n  - name: down\n    url: http://127.0.0.1:9/mcp\n    transport: http\n    connect_timeout_seconds: 2\n",
    );
    mcpchat()
        .arg("--config")
        .arg(&config)
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no MCP server could be inspected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_lists_tools() {
    let mcp = MockServer::start().await;
    mount_calculator(&mcp, "102").await;
    let (_dir, config) = temp_config_file(&config_yaml(&mcp.uri(), "http://127.0.0.1:9"));

    mcpchat()
        .arg("--config")
        .arg(&config)
        .arg("inspect")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tool: add"))
        .stdout(predicate::str::contains("- a: first addend (required)"))
        .stdout(predicate::str::contains("Ping: ok"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_prints_final_answer() {
    let mcp = MockServer::start().await;
    mount_calculator(&mcp, "102").await;
    let model = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Tool 'add' returned: 102"))
        .respond_with(completion("The sum is 102."))
        .mount(&model)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(
            r#"{"tool": "add", "arguments": {"a": 2, "b": 100}}"#,
        ))
        .mount(&model)
        .await;
    let (_dir, config) = temp_config_file(&config_yaml(&mcp.uri(), &model.uri()));

    mcpchat()
        .arg("--config")
        .arg(&config)
        .args(["ask", "use the add tool with 2 and 100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[calling add"))
        .stdout(predicate::str::contains("The sum is 102."));
}
