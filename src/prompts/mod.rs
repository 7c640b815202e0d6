//! System prompts
//!
//! This module builds the system prompt that introduces the discovered
//! tools to the model and fixes the textual convention for requesting one.

pub mod tool_prompt;

use crate::mcp::types::ToolDescriptor;

/// Build the system prompt for a tool catalogue
///
/// Uses `template` when given (it may contain `{tools_description}`),
/// otherwise [`tool_prompt::DEFAULT_TEMPLATE`].
///
/// # Examples
///
/// ```
/// use mcpchat::prompts::build_system_prompt;
///
/// let prompt = build_system_prompt(None, &[]);
/// assert!(prompt.contains("\"arguments\""));
/// ```
pub fn build_system_prompt(template: Option<&str>, tools: &[ToolDescriptor]) -> String {
    tool_prompt::render(template.unwrap_or(tool_prompt::DEFAULT_TEMPLATE), tools)
}
