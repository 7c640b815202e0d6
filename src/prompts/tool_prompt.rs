//! Tool-use system prompt
//!
//! The default template tells the model which tools exist and the exact
//! JSON shape to answer with when it wants one run. The shape must match
//! what [`crate::agent::intent::parse_tool_call`] accepts.

use crate::mcp::types::ToolDescriptor;

/// Placeholder replaced by the rendered tool catalogue.
pub const TOOLS_PLACEHOLDER: &str = "{tools_description}";

/// Default system prompt template.
pub const DEFAULT_TEMPLATE: &str = r#"You are a helpful assistant with access to these tools:

{tools_description}

Use a tool only when the user's request needs it. When you do, reply with
ONLY a JSON object in exactly this format:

{
  "tool": "tool-name",
  "arguments": {
    "argument-name": "value"
  }
}

IMPORTANT: Do not add explanations, comments or any text outside the JSON.
The reply must contain only the JSON object, with nothing before or after it.

When a message starts with "Tool '<name>' returned:" it is the raw result of
a tool you asked for. Turn it into a clear, natural answer for the user.
When it starts with "Tool '<name>' failed:", explain the failure or try a
different approach."#;

/// Render one tool as a catalogue entry.
///
/// # Examples
///
/// ```
/// use mcpchat::mcp::types::ToolDescriptor;
/// use mcpchat::prompts::tool_prompt::format_tool;
///
/// let tool: ToolDescriptor = serde_json::from_value(serde_json::json!({
///     "name": "add",
///     "description": "Add two numbers",
///     "inputSchema": {
///         "type": "object",
///         "properties": { "a": { "type": "integer", "description": "first" } },
///         "required": ["a"]
///     }
/// })).unwrap();
/// assert_eq!(
///     format_tool(&tool),
///     "Tool: add\nDescription: Add two numbers\nArguments:\n- a: first (required)"
/// );
/// ```
pub fn format_tool(tool: &ToolDescriptor) -> String {
    let arguments: Vec<String> = tool
        .parameters()
        .into_iter()
        .map(|param| {
            let description = param.description.as_deref().unwrap_or("No description");
            if param.required {
                format!("- {}: {} (required)", param.name, description)
            } else {
                format!("- {}: {}", param.name, description)
            }
        })
        .collect();

    let mut entry = format!(
        "Tool: {}\nDescription: {}\nArguments:",
        tool.name,
        tool.description.as_deref().unwrap_or("No description")
    );
    for line in arguments {
        entry.push('\n');
        entry.push_str(&line);
    }
    entry
}

/// Render the whole catalogue, one blank line between entries.
pub fn format_tools(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "Available tools:\n(none)".to_string();
    }
    let entries: Vec<String> = tools.iter().map(format_tool).collect();
    format!("Available tools:\n\n{}", entries.join("\n\n"))
}

/// Fill `template` with the tool catalogue. A template without the
/// placeholder gets the catalogue appended.
pub fn render(template: &str, tools: &[ToolDescriptor]) -> String {
    let catalogue = format_tools(tools);
    if template.contains(TOOLS_PLACEHOLDER) {
        template.replace(TOOLS_PLACEHOLDER, &catalogue)
    } else {
        format!("{template}\n\n{catalogue}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, schema: serde_json::Value) -> ToolDescriptor {
        serde_json::from_value(json!({
            "name": name,
            "description": format!("{name} tool"),
            "inputSchema": schema
        }))
        .unwrap()
    }

    #[test]
    fn test_optional_and_undescribed_arguments() {
        let t = tool(
            "search",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer" },
                    "query": { "type": "string", "description": "text to find" }
                },
                "required": ["query"]
            }),
        );
        let rendered = format_tool(&t);
        assert!(rendered.contains("- limit: No description\n"));
        assert!(rendered.ends_with("- query: text to find (required)"));
    }

    #[test]
    fn test_tool_without_properties() {
        let t = tool("now", json!({ "type": "object" }));
        assert_eq!(format_tool(&t), "Tool: now\nDescription: now tool\nArguments:");
    }

    #[test]
    fn test_default_template_lists_tools() {
        let tools = vec![
            tool("add", json!({ "type": "object" })),
            tool("sub", json!({ "type": "object" })),
        ];
        let prompt = render(DEFAULT_TEMPLATE, &tools);
        assert!(!prompt.contains(TOOLS_PLACEHOLDER));
        assert!(prompt.contains("Tool: add"));
        assert!(prompt.contains("Tool: sub"));
        assert!(prompt.contains(r#""tool": "tool-name""#));
    }

    #[test]
    fn test_template_without_placeholder_gets_catalogue_appended() {
        let prompt = render("Be brief.", &[tool("add", json!({}))]);
        assert!(prompt.starts_with("Be brief.\n\nAvailable tools:"));
    }

    #[test]
    fn test_no_tools() {
        let prompt = render(DEFAULT_TEMPLATE, &[]);
        assert!(prompt.contains("(none)"));
    }
}
