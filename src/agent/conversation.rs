//! Append-only conversation history
//!
//! A [`Conversation`] is the ordered sequence of turns exchanged between the
//! user, the model and the tools. Turns are only ever appended. The one
//! structural rule is that a tool observation always directly follows the
//! assistant turn that requested that tool; [`Conversation::record_tool_round`]
//! appends both together so callers cannot break it.

use crate::providers::Message;

/// One unit of conversation content.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Instructions for the model (the tool catalogue lives here).
    System(String),
    User(String),
    Assistant {
        content: String,
        /// Tool this turn asked for, if it was a tool request.
        requested_tool: Option<String>,
    },
    /// Outcome of a tool request, success or failure.
    ToolObservation {
        tool: String,
        content: String,
        failed: bool,
    },
}

impl Turn {
    pub fn role(&self) -> &'static str {
        match self {
            Turn::System(_) => "system",
            Turn::User(_) => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::ToolObservation { .. } => "tool-observation",
        }
    }

    /// Raw text of the turn.
    pub fn content(&self) -> &str {
        match self {
            Turn::System(c) | Turn::User(c) => c,
            Turn::Assistant { content, .. } | Turn::ToolObservation { content, .. } => content,
        }
    }

    /// Shape sent to the inference backend. Backends know no tool role, so
    /// observations travel as system messages naming the tool.
    pub fn to_message(&self) -> Message {
        match self {
            Turn::System(c) => Message::system(c.as_str()),
            Turn::User(c) => Message::user(c.as_str()),
            Turn::Assistant { content, .. } => Message::assistant(content.as_str()),
            Turn::ToolObservation {
                tool,
                content,
                failed: false,
            } => Message::system(format!("Tool '{tool}' returned: {content}")),
            Turn::ToolObservation {
                tool,
                content,
                failed: true,
            } => Message::system(format!("Tool '{tool}' failed: {content}")),
        }
    }
}

/// Ordered, append-only turn history of one conversation.
///
/// # Examples
///
/// ```
/// use mcpchat::agent::Conversation;
///
/// let mut conversation = Conversation::with_system_prompt("You can use tools.");
/// conversation.push_user("use the add tool with 2 and 100");
/// conversation.record_tool_round(
///     r#"{"tool": "add", "arguments": {"a": 2, "b": 100}}"#,
///     "add",
///     "102",
///     false,
/// );
/// conversation.push_assistant("The sum is 102.");
///
/// assert_eq!(conversation.len(), 5);
/// assert!(conversation.check_observations().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation whose first turn is a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System(prompt.into())],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::User(content.into()));
    }

    /// Append an assistant turn that did not request a tool.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::Assistant {
            content: content.into(),
            requested_tool: None,
        });
    }

    /// Append the assistant turn that requested `tool`, immediately followed
    /// by the observation of that request.
    pub fn record_tool_round(
        &mut self,
        assistant_text: impl Into<String>,
        tool: &str,
        observation: impl Into<String>,
        failed: bool,
    ) {
        self.turns.push(Turn::Assistant {
            content: assistant_text.into(),
            requested_tool: Some(tool.to_string()),
        });
        self.turns.push(Turn::ToolObservation {
            tool: tool.to_string(),
            content: observation.into(),
            failed,
        });
    }

    /// Text of the most recent assistant turn.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// History in the shape the inference backend expects.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    /// Verify every observation directly follows an assistant turn that
    /// requested the same tool. Returns the index of the first offender.
    pub fn check_observations(&self) -> Result<(), usize> {
        for (index, turn) in self.turns.iter().enumerate() {
            let Turn::ToolObservation { tool, .. } = turn else {
                continue;
            };
            let preceded_by_request = index
                .checked_sub(1)
                .and_then(|prev| self.turns.get(prev))
                .map(|prev| {
                    matches!(prev, Turn::Assistant { requested_tool: Some(t), .. } if t == tool)
                })
                .unwrap_or(false);
            if !preceded_by_request {
                return Err(index);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_keep_order() {
        let mut conversation = Conversation::with_system_prompt("sys");
        conversation.push_user("hi");
        conversation.push_assistant("hello");

        let roles: Vec<&str> = conversation.turns().iter().map(Turn::role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(conversation.last_assistant_text(), Some("hello"));
    }

    #[test]
    fn test_appending_never_changes_earlier_turns() {
        let mut conversation = Conversation::new();
        conversation.push_user("first");
        let snapshot = conversation.turns().to_vec();

        conversation.record_tool_round("{...}", "add", "3", false);
        conversation.push_assistant("done");

        assert_eq!(&conversation.turns()[..snapshot.len()], snapshot.as_slice());
    }

    #[test]
    fn test_tool_round_satisfies_observation_rule() {
        let mut conversation = Conversation::new();
        conversation.push_user("add");
        conversation.record_tool_round("call add", "add", "3", false);
        conversation.record_tool_round("call div", "divide", "division by zero", true);
        assert!(conversation.check_observations().is_ok());
    }

    #[test]
    fn test_orphan_observation_detected() {
        let conversation = Conversation {
            turns: vec![
                Turn::User("hi".into()),
                Turn::ToolObservation {
                    tool: "add".into(),
                    content: "3".into(),
                    failed: false,
                },
            ],
        };
        assert_eq!(conversation.check_observations(), Err(1));
    }

    #[test]
    fn test_observation_for_other_tool_detected() {
        let conversation = Conversation {
            turns: vec![
                Turn::Assistant {
                    content: "call add".into(),
                    requested_tool: Some("add".into()),
                },
                Turn::ToolObservation {
                    tool: "sub".into(),
                    content: "3".into(),
                    failed: false,
                },
            ],
        };
        assert_eq!(conversation.check_observations(), Err(1));
    }

    #[test]
    fn test_observations_rendered_as_system_messages() {
        let mut conversation = Conversation::new();
        conversation.record_tool_round("call add", "add", "102", false);
        conversation.record_tool_round("call div", "divide", "division by zero", true);

        let messages = conversation.to_messages();
        assert_eq!(messages[1].role, "system");
        assert_eq!(messages[1].content, "Tool 'add' returned: 102");
        assert_eq!(messages[3].content, "Tool 'divide' failed: division by zero");
    }
}
