//! MCP (Model Context Protocol) client support
//!
//! Everything needed to talk to remote tool hosts: wire types, a JSON-RPC
//! client, typed protocol calls and the lifecycle-managed session the
//! conversation controller drives.
//!
//! # Module Layout
//!
//! - `types`     -- MCP protocol types and JSON-RPC primitives
//! - `client`    -- Channel-backed async JSON-RPC 2.0 client
//! - `protocol`  -- Typed MCP requests over `RpcClient`, with pagination
//! - `session`   -- `McpSession`: lifecycle gate and error classification
//! - `transport` -- `Transport` trait, the connection state machine and the
//!   SSE, Streamable HTTP and fake implementations
//! - `config`    -- Per-server connection settings

pub mod client;
pub mod config;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use session::{McpSession, SessionState};
pub use types::*;
