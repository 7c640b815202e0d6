/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`    - Interactive chat with tool calling
- `ask`     - One question, one answer
- `inspect` - List what each configured MCP server offers

Every handler that connects to servers shuts its sessions down on all exit
paths, including errors and Ctrl-C.
*/

use crate::agent::{Agent, AgentEvent};
use crate::config::Config;
use crate::error::Result;
use crate::providers::{create_provider, Provider};
use std::io::Write;
use std::sync::Arc;

// Special commands parser for the interactive session
pub mod special_commands;

fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let provider = create_provider(&config.provider)?;
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "Using inference backend"
    );
    Ok(Arc::from(provider))
}

/// Prints agent activity to the terminal. Fragments are only echoed when
/// streaming; otherwise the caller prints the final answer.
fn print_event(event: AgentEvent<'_>, streaming: bool) {
    use colored::Colorize;

    match event {
        AgentEvent::Fragment(text) if streaming => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::Fragment(_) => {}
        AgentEvent::ToolCall { name, arguments } => {
            if streaming {
                println!();
            }
            let args = serde_json::Value::Object(arguments.clone());
            println!("{}", format!("[calling {name} {args}]").cyan());
        }
        AgentEvent::ToolResult {
            name,
            content,
            failed,
        } => {
            if failed {
                println!("{}", format!("[{name} failed: {content}]").yellow());
            } else {
                println!("{}", format!("[{name} returned: {content}]").dimmed());
            }
        }
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Connects to every configured server, builds the agent, and runs a
    //! readline loop that hands each line to the agent.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be built or any server fails
    /// to initialize. Errors while answering a message are printed and the
    /// session continues.
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let provider = build_provider(&config)?;
        let mut agent = Agent::connect(&config, provider).await?;

        let result = chat_loop(&mut agent, &config).await;
        agent.shutdown().await;
        tracing::info!("Chat session ended");
        result
    }

    async fn chat_loop(agent: &mut Agent, config: &Config) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        let streaming = agent.settings().stream;

        print_welcome_banner(agent, config);

        loop {
            let line = match rl.readline(&format!("{} ", "you>".green().bold())) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(e) => {
                    eprintln!("Error: {:?}", e);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(trimmed);

            match parse_special_command(trimmed, &config.chat) {
                Ok(SpecialCommand::Exit) => {
                    println!("Goodbye!");
                    break;
                }
                Ok(SpecialCommand::Help) => {
                    print_help(&config.chat);
                    continue;
                }
                Ok(SpecialCommand::ListTools) => {
                    print_tools(agent);
                    continue;
                }
                Ok(SpecialCommand::ShowStatus) => {
                    print_status(agent);
                    continue;
                }
                Ok(SpecialCommand::None) => {}
                Err(e) => {
                    println!("{}", e.to_string().yellow());
                    continue;
                }
            }

            if streaming {
                print!("{} ", "assistant>".blue().bold());
                let _ = std::io::stdout().flush();
            }

            let outcome = tokio::select! {
                outcome = agent.respond_with(trimmed, |event| print_event(event, streaming)) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    println!("\nInterrupted, goodbye!");
                    break;
                }
            };

            match outcome {
                Ok(answer) if streaming => {
                    tracing::debug!(len = answer.len(), "Streamed answer complete");
                    println!("\n");
                }
                Ok(answer) => println!("{} {}\n", "assistant>".blue().bold(), answer),
                Err(e) => eprintln!("{} {:#}\n", "error:".red().bold(), e),
            }
        }

        Ok(())
    }

    fn print_welcome_banner(agent: &Agent, config: &Config) {
        println!("{}", "mcpchat".bold());
        println!(
            "Model:   {} ({})",
            config.provider.model(),
            config.provider.provider_type
        );
        for session in agent.sessions() {
            println!("Server:  {}", session.name());
        }
        println!("Tools:   {}", agent.tools().len());
        println!(
            "Type /help for commands, or one of [{}] to leave.\n",
            config.chat.exit_commands.join(", ")
        );
    }

    fn print_tools(agent: &Agent) {
        if agent.tools().is_empty() {
            println!("No tools available.\n");
            return;
        }
        for tool in agent.tools() {
            println!(
                "{} - {}",
                tool.name.cyan(),
                tool.description.as_deref().unwrap_or("No description")
            );
        }
        println!();
    }

    fn print_status(agent: &Agent) {
        println!("State:         {}", agent.state());
        println!("Turns:         {}", agent.conversation().len());
        println!("Tools:         {}", agent.tools().len());
        for session in agent.sessions() {
            println!("Server {}: {}", session.name(), session.state());
        }
        println!();
    }
}

// Single question handler
pub mod ask {
    //! One-shot question mode: connect, answer one message, disconnect.

    use super::*;

    /// Answer `prompt` and print the result to stdout
    ///
    /// # Errors
    ///
    /// Returns connection, configuration and inference errors. Sessions are
    /// shut down before returning in every case.
    pub async fn run_ask(config: Config, prompt: String) -> Result<()> {
        tracing::info!("Answering a single question");

        let provider = build_provider(&config)?;
        let mut agent = Agent::connect(&config, provider).await?;
        let streaming = agent.settings().stream;

        let outcome = tokio::select! {
            outcome = agent.respond_with(&prompt, |event| print_event(event, streaming)) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        agent.shutdown().await;

        match outcome {
            Some(Ok(_)) if streaming => {
                println!();
                Ok(())
            }
            Some(Ok(answer)) => {
                println!("{answer}");
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => {
                tracing::warn!("Interrupted");
                Ok(())
            }
        }
    }
}

// Server inspection handler
pub mod inspect;
