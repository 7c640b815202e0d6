//! `inspect` subcommand handler
//!
//! Connects to each configured MCP server in turn and prints its tools
//! (with arguments), resources, resource templates and prompts, then pings
//! it. A server that cannot be reached is reported and skipped.

use std::fmt::Write as _;
use std::time::Instant;

use crate::config::Config;
use crate::error::{McpChatError, Result};
use crate::mcp::session::McpSession;
use crate::prompts::tool_prompt::format_tool;

/// Inspect every configured server
///
/// # Errors
///
/// Returns [`McpChatError::Connection`] if no server could be inspected.
pub async fn run_inspect(config: Config) -> Result<()> {
    tracing::info!("Inspecting {} MCP servers", config.servers.len());

    let mut failures = 0usize;
    for server in &config.servers {
        let mut session = match McpSession::from_config(server) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("{}: {:#}\n", server.name, e);
                failures += 1;
                continue;
            }
        };

        match inspect_session(&mut session).await {
            Ok(report) => println!("{report}"),
            Err(e) => {
                eprintln!("{} ({}): {:#}\n", server.name, server.url, e);
                failures += 1;
            }
        }
        session.cleanup().await;
    }

    if failures == config.servers.len() {
        return Err(McpChatError::Connection("no MCP server could be inspected".to_string()).into());
    }
    Ok(())
}

/// Initialize `session` and render everything it offers. The session is
/// left `Ready`; the caller cleans it up.
///
/// # Errors
///
/// Returns the initialization error. Failures of individual listings are
/// reported inline.
pub async fn inspect_session(session: &mut McpSession) -> Result<String> {
    session.initialize().await?;

    let mut out = String::new();
    let (supports_resources, supports_prompts) = match session.server_info() {
        Some(info) => {
            let _ = writeln!(
                out,
                "== {} ({} {}, protocol {}) ==",
                session.name(),
                info.server_info.name,
                info.server_info.version,
                info.protocol_version
            );
            if let Some(instructions) = &info.instructions {
                let _ = writeln!(out, "{instructions}");
            }
            (
                info.capabilities.resources.is_some(),
                info.capabilities.prompts.is_some(),
            )
        }
        None => {
            let _ = writeln!(out, "== {} ==", session.name());
            (false, false)
        }
    };

    let _ = writeln!(out, "\nTools:");
    match session.list_tools().await {
        Ok(tools) if tools.is_empty() => out.push_str("  (none)\n"),
        Ok(tools) => {
            for tool in &tools {
                for line in format_tool(tool).lines() {
                    let _ = writeln!(out, "  {line}");
                }
                out.push('\n');
            }
        }
        Err(e) => {
            let _ = writeln!(out, "  (unavailable: {e})");
        }
    }

    let _ = writeln!(out, "\nResources:");
    if !supports_resources {
        out.push_str("  (not supported)\n");
    } else {
        match session.list_resources().await {
            Ok(resources) if resources.is_empty() => out.push_str("  (none)\n"),
            Ok(resources) => {
                for r in &resources {
                    let _ = writeln!(
                        out,
                        "  {} ({}){}",
                        r.uri,
                        r.name,
                        r.description
                            .as_deref()
                            .map(|d| format!(": {d}"))
                            .unwrap_or_default()
                    );
                }
            }
            Err(e) => {
                let _ = writeln!(out, "  (unavailable: {e})");
            }
        }

        let _ = writeln!(out, "\nResource templates:");
        match session.list_resource_templates().await {
            Ok(templates) if templates.is_empty() => out.push_str("  (none)\n"),
            Ok(templates) => {
                for t in &templates {
                    let _ = writeln!(out, "  {} ({})", t.uri_template, t.name);
                }
            }
            Err(e) => {
                let _ = writeln!(out, "  (unavailable: {e})");
            }
        }
    }

    let _ = writeln!(out, "\nPrompts:");
    if !supports_prompts {
        out.push_str("  (not supported)\n");
    } else {
        match session.list_prompts().await {
            Ok(prompts) if prompts.is_empty() => out.push_str("  (none)\n"),
            Ok(prompts) => {
                for p in &prompts {
                    let args: Vec<String> = p
                        .arguments
                        .iter()
                        .map(|a| {
                            if a.required {
                                a.name.clone()
                            } else {
                                format!("{}?", a.name)
                            }
                        })
                        .collect();
                    let _ = writeln!(
                        out,
                        "  {}({}): {}",
                        p.name,
                        args.join(", "),
                        p.description.as_deref().unwrap_or("No description")
                    );
                }
            }
            Err(e) => {
                let _ = writeln!(out, "  (unavailable: {e})");
            }
        }
    }

    let started = Instant::now();
    match session.ping().await {
        Ok(()) => {
            let _ = writeln!(out, "\nPing: ok ({} ms)", started.elapsed().as_millis());
        }
        Err(e) => {
            let _ = writeln!(out, "\nPing: failed ({e})");
        }
    }

    Ok(out)
}
