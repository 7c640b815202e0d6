//! Special commands parser for interactive chat mode
//!
//! Inputs starting with `/` are handled by the REPL instead of being sent
//! to the model. The configured exit keywords (`quit`, `exit`, `stop` by
//! default) end the session. Commands are case-insensitive.

use crate::config::ChatConfig;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// List the tools offered to the model, grouped by server
    ListTools,

    /// Show provider, servers and conversation length
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; the input goes to the model
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns [`CommandError::UnknownCommand`] if the input starts with `/`
/// but is not a known command.
///
/// # Examples
///
/// ```
/// use mcpchat::commands::special_commands::{parse_special_command, SpecialCommand};
/// use mcpchat::config::ChatConfig;
///
/// let chat = ChatConfig::default();
/// assert_eq!(parse_special_command("/tools", &chat).unwrap(), SpecialCommand::ListTools);
/// assert_eq!(parse_special_command("Quit", &chat).unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("add 2 and 3", &chat).unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo", &chat).is_err());
/// ```
pub fn parse_special_command(input: &str, chat: &ChatConfig) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();

    if chat.is_exit_command(trimmed) {
        return Ok(SpecialCommand::Exit);
    }

    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    match trimmed.to_lowercase().as_str() {
        "/tools" => Ok(SpecialCommand::ListTools),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for the interactive session
pub fn print_help(chat: &ChatConfig) {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

  /tools          - List the tools the model can call
  /status         - Show provider, servers and conversation length
  /help           - Show this help
  /exit, /quit    - Leave the session

Typing any of [{}] also ends the session, as do Ctrl-C and Ctrl-D.
Everything else is sent to the model.
"#,
        chat.exit_commands.join(", ")
    );
}
