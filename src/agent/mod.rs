//! Conversation controller
//!
//! This module holds the conversation history, the parser that recognizes
//! tool requests in model output, and the loop that ties the model to the
//! MCP sessions.

pub mod conversation;
pub mod core;
pub mod intent;

pub use conversation::{Conversation, Turn};
pub use core::{Agent, AgentEvent, AgentSettings, LoopState};
pub use intent::{parse_tool_call, ToolCallIntent};
