//! Tool-call intent parser
//!
//! The system prompt asks the model to answer with a bare JSON object
//! `{"tool": "<name>", "arguments": {...}}` when it wants a tool run. This
//! module turns free-form assistant text into a [`ToolCallIntent`]:
//!
//! 1. Markdown code fences (```` ``` ```` / ```` ```json ````) are removed.
//! 2. The span from the first `{` to the last `}` is taken.
//! 3. The span must decode to an object with a non-empty string `tool` and
//!    an object `arguments`.
//!
//! Text without braces, or an object that never mentions `tool`, is an
//! ordinary answer. An object that names a tool but cannot be used as a
//! call is [`ToolCallIntent::Malformed`]; arguments are never guessed.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::mcp::types::ToolDescriptor;

/// What an assistant turn asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallIntent {
    /// A direct answer.
    NoCall,
    /// A well-formed request to run `name` with `arguments`.
    Call {
        name: String,
        arguments: Map<String, Value>,
    },
    /// Looked like a tool request but could not be used as one.
    Malformed(String),
}

impl ToolCallIntent {
    pub fn is_call(&self) -> bool {
        matches!(self, ToolCallIntent::Call { .. })
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?i)```(?:json)?").ok())
        .as_ref()
}

fn tool_key_regex() -> Option<&'static Regex> {
    static TOOL_KEY: OnceLock<Option<Regex>> = OnceLock::new();
    TOOL_KEY
        .get_or_init(|| Regex::new(r#""tool"\s*:"#).ok())
        .as_ref()
}

/// Remove code fences and surrounding backticks/whitespace.
fn strip_fences(text: &str) -> String {
    let stripped = match fence_regex() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    stripped
        .trim_matches(|c: char| c == '`' || c.is_whitespace())
        .to_string()
}

/// First `{` through last `}`, if both exist in that order.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse assistant output into a tool-call intent.
///
/// # Examples
///
/// ```
/// use mcpchat::agent::intent::{parse_tool_call, ToolCallIntent};
///
/// let intent = parse_tool_call("```json\n{\"tool\": \"add\", \"arguments\": {\"a\": 2, \"b\": 100}}\n```");
/// assert!(intent.is_call());
///
/// assert_eq!(parse_tool_call("The sum is 102."), ToolCallIntent::NoCall);
/// ```
pub fn parse_tool_call(text: &str) -> ToolCallIntent {
    let cleaned = strip_fences(text);
    let Some(span) = object_span(&cleaned) else {
        return ToolCallIntent::NoCall;
    };
    let mentions_tool = tool_key_regex().map(|re| re.is_match(span)).unwrap_or(false);

    let value: Value = match serde_json::from_str(span) {
        Ok(value) => value,
        Err(e) if mentions_tool => {
            return ToolCallIntent::Malformed(format!("tool request is not valid JSON: {e}"))
        }
        Err(_) => return ToolCallIntent::NoCall,
    };

    let Value::Object(mut object) = value else {
        return ToolCallIntent::NoCall;
    };
    let Some(tool) = object.remove("tool") else {
        return ToolCallIntent::NoCall;
    };

    let name = match tool {
        Value::String(name) if !name.trim().is_empty() => name.trim().to_string(),
        Value::String(_) => return ToolCallIntent::Malformed("tool name is empty".to_string()),
        other => {
            return ToolCallIntent::Malformed(format!(
                "tool name must be a string, got {other}"
            ))
        }
    };

    match object.remove("arguments") {
        Some(Value::Object(arguments)) => ToolCallIntent::Call { name, arguments },
        Some(other) => ToolCallIntent::Malformed(format!(
            "arguments for '{name}' must be an object, got {other}"
        )),
        None => ToolCallIntent::Malformed(format!("tool request for '{name}' has no arguments")),
    }
}

/// Check a parsed call against the tool's declared input schema. A
/// mismatch turns the call into [`ToolCallIntent::Malformed`]; values are
/// never coerced.
pub fn check_against_schema(intent: ToolCallIntent, tool: &ToolDescriptor) -> ToolCallIntent {
    match intent {
        ToolCallIntent::Call { name, arguments } => match tool.check_arguments(&arguments) {
            Ok(()) => ToolCallIntent::Call { name, arguments },
            Err(reason) => ToolCallIntent::Malformed(format!("arguments for '{name}': {reason}")),
        },
        other => other,
    }
}
