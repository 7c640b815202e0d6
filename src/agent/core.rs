//! Conversation controller
//!
//! The [`Agent`] drives one conversation:
//!
//! ```text
//! AwaitingUserInput -> ModelThinking -> {ToolDispatch -> ModelThinking}* -> FinalAnswer
//! ```
//!
//! For each user message it asks the provider for the next turn, parses the
//! reply for a tool request, dispatches the request to the MCP session that
//! offers the tool, records the observation and asks again. It stops at the
//! first reply that is not a usable tool request, or when the configured
//! number of tool rounds has been spent. Tool failures never end the turn;
//! they become observations the model can react to.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agent::conversation::Conversation;
use crate::agent::intent::{check_against_schema, parse_tool_call, ToolCallIntent};
use crate::config::{ChatConfig, Config};
use crate::error::{McpChatError, Result};
use crate::mcp::session::McpSession;
use crate::mcp::types::ToolDescriptor;
use crate::prompts;
use crate::providers::{collect_stream, ChatOptions, Provider};

/// Where the controller is in its per-message cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    ModelThinking,
    ToolDispatch,
    FinalAnswer,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::AwaitingUserInput => "awaiting-user-input",
            LoopState::ModelThinking => "model-thinking",
            LoopState::ToolDispatch => "tool-dispatch",
            LoopState::FinalAnswer => "final-answer",
        };
        f.write_str(name)
    }
}

/// Progress notifications emitted while a user message is handled.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent<'a> {
    /// A piece of model output, as it streams in.
    Fragment(&'a str),
    /// A tool request is about to be dispatched.
    ToolCall {
        name: &'a str,
        arguments: &'a Map<String, Value>,
    },
    /// The observation recorded for a tool request.
    ToolResult {
        name: &'a str,
        content: &'a str,
        failed: bool,
    },
}

/// Controller settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Tool rounds allowed per user message before the loop is cut short.
    pub max_tool_rounds: usize,
    /// Use `chat_stream` instead of `chat`.
    pub stream: bool,
    /// Temperature for the first model call of each user message, where the
    /// model decides whether to call a tool.
    pub tool_temperature: Option<f32>,
    /// System prompt template; `None` uses the built-in one.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for AgentSettings {
    fn from(chat: &ChatConfig) -> Self {
        Self {
            max_tool_rounds: chat.max_tool_rounds,
            stream: chat.stream,
            tool_temperature: chat.tool_temperature,
            system_prompt: chat.system_prompt.clone(),
        }
    }
}

/// The conversation controller
///
/// # Examples
///
/// ```no_run
/// use mcpchat::agent::Agent;
/// use mcpchat::config::Config;
/// use mcpchat::providers::create_provider;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::default();
/// let provider = create_provider(&config.provider)?;
/// let mut agent = Agent::connect(&config, provider.into()).await?;
/// let answer = agent.respond("use the add tool with 2 and 100").await;
/// agent.shutdown().await;
/// println!("{}", answer?);
/// # Ok(())
/// # }
/// ```
pub struct Agent {
    provider: Arc<dyn Provider>,
    sessions: Vec<McpSession>,
    settings: AgentSettings,
    conversation: Conversation,
    /// Deduplicated catalogue across all sessions, in discovery order.
    tools: Vec<ToolDescriptor>,
    state: LoopState,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("sessions", &self.sessions.len())
            .field("tools", &self.tools.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Creates a controller over sessions that have not been initialized.
    /// Call [`Agent::start`] before the first message.
    pub fn new(
        provider: Arc<dyn Provider>,
        sessions: Vec<McpSession>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            sessions,
            settings,
            conversation: Conversation::new(),
            tools: Vec::new(),
            state: LoopState::AwaitingUserInput,
        }
    }

    /// Build sessions for every configured server and start them.
    ///
    /// # Errors
    ///
    /// Returns the first session construction or initialization error; any
    /// session already started is cleaned up first.
    pub async fn connect(config: &Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let sessions = config
            .servers
            .iter()
            .map(McpSession::from_config)
            .collect::<Result<Vec<_>>>()?;
        let mut agent = Self::new(provider, sessions, AgentSettings::from(&config.chat));
        agent.start().await?;
        Ok(agent)
    }

    /// Initialize every session, discover tools and install the system
    /// prompt.
    ///
    /// # Errors
    ///
    /// Fails if there are no sessions or any session fails to initialize. In
    /// that case every session is cleaned up before returning.
    pub async fn start(&mut self) -> Result<()> {
        if self.sessions.is_empty() {
            return Err(McpChatError::Config("no MCP servers configured".to_string()).into());
        }

        for index in 0..self.sessions.len() {
            let result = self.sessions[index].initialize().await;
            if let Err(e) = result {
                warn!(
                    server = %self.sessions[index].name(),
                    "Failed to initialize MCP session, shutting down: {e:#}"
                );
                self.shutdown().await;
                return Err(e);
            }
            info!(server = %self.sessions[index].name(), "Initialized MCP session");
        }

        self.discover_tools().await;
        let prompt = prompts::build_system_prompt(self.settings.system_prompt.as_deref(), &self.tools);
        self.conversation = Conversation::with_system_prompt(prompt);
        self.state = LoopState::AwaitingUserInput;
        Ok(())
    }

    /// Refresh the tool catalogue from every session. A failing server is
    /// logged and contributes no tools.
    pub async fn discover_tools(&mut self) {
        self.tools.clear();
        let mut seen = HashSet::new();

        for session in self.sessions.iter_mut() {
            match session.list_tools().await {
                Ok(tools) => {
                    debug!(server = %session.name(), count = tools.len(), "Discovered tools");
                    for tool in tools {
                        if !seen.insert(tool.name.clone()) {
                            debug!(tool = %tool.name, server = %session.name(), "Tool already offered by an earlier server");
                            continue;
                        }
                        self.tools.push(tool);
                    }
                }
                Err(e) => warn!(server = %session.name(), "Failed to list tools: {e:#}"),
            }
        }
        info!("{} tools available", self.tools.len());
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn sessions(&self) -> &[McpSession] {
        &self.sessions
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Handle one user message and return the final answer.
    pub async fn respond(&mut self, input: &str) -> Result<String> {
        self.respond_with(input, |_| {}).await
    }

    /// Handle one user message, reporting fragments and tool activity to
    /// `on_event` as they happen.
    ///
    /// # Errors
    ///
    /// Only inference failures end the turn early
    /// ([`McpChatError::ModelUnavailable`], [`McpChatError::ModelResponse`]).
    /// Tool failures are recorded as observations instead.
    pub async fn respond_with<F>(&mut self, input: &str, mut on_event: F) -> Result<String>
    where
        F: FnMut(AgentEvent<'_>) + Send,
    {
        self.conversation.push_user(input);
        let mut rounds = 0usize;

        loop {
            self.state = LoopState::ModelThinking;
            let options = match (rounds, self.settings.tool_temperature) {
                (0, Some(t)) => ChatOptions::with_temperature(t),
                _ => ChatOptions::default(),
            };
            let reply = match self.infer(&options, &mut on_event).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.state = LoopState::AwaitingUserInput;
                    return Err(e);
                }
            };

            let (name, arguments) = match self.resolve_intent(&reply) {
                Some(call) => call,
                None => {
                    self.conversation.push_assistant(reply.as_str());
                    self.state = LoopState::FinalAnswer;
                    return Ok(reply);
                }
            };

            self.state = LoopState::ToolDispatch;
            on_event(AgentEvent::ToolCall {
                name: &name,
                arguments: &arguments,
            });
            let (observation, failed) = self.dispatch(&name, arguments).await;
            on_event(AgentEvent::ToolResult {
                name: &name,
                content: &observation,
                failed,
            });
            self.conversation
                .record_tool_round(reply.as_str(), &name, observation, failed);

            rounds += 1;
            if rounds >= self.settings.max_tool_rounds {
                warn!(
                    "Stopping after {} consecutive tool rounds",
                    self.settings.max_tool_rounds
                );
                self.state = LoopState::FinalAnswer;
                return Ok(reply);
            }
        }
    }

    /// Ask the provider for the next assistant turn.
    async fn infer<F>(&self, options: &ChatOptions, on_event: &mut F) -> Result<String>
    where
        F: FnMut(AgentEvent<'_>) + Send,
    {
        let observations = self.conversation.check_observations();
        if let Err(index) = observations {
            tracing::error!(index, "tool observation without a matching request in history");
        }
        debug_assert!(observations.is_ok(), "orphan tool observation in history");

        let messages = self.conversation.to_messages();
        debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            messages = messages.len(),
            "Requesting model turn"
        );

        if self.settings.stream {
            let stream = self.provider.chat_stream(&messages, options).await?;
            collect_stream(stream, |fragment| on_event(AgentEvent::Fragment(fragment))).await
        } else {
            let reply = self.provider.chat(&messages, options).await?;
            on_event(AgentEvent::Fragment(&reply));
            Ok(reply)
        }
    }

    /// Decide whether `reply` is a usable tool request. Unknown tools are
    /// usable here; [`Agent::dispatch`] answers them locally.
    fn resolve_intent(&self, reply: &str) -> Option<(String, Map<String, Value>)> {
        let intent = match parse_tool_call(reply) {
            ToolCallIntent::Call { name, arguments } => {
                match self.route(&name).and_then(|session| session.find_tool(&name)) {
                    Some(tool) => check_against_schema(ToolCallIntent::Call { name, arguments }, tool),
                    None => ToolCallIntent::Call { name, arguments },
                }
            }
            other => other,
        };

        match intent {
            ToolCallIntent::Call { name, arguments } => {
                debug!(tool = %name, "Parsed tool request");
                Some((name, arguments))
            }
            ToolCallIntent::Malformed(reason) => {
                warn!("Ignoring malformed tool request: {reason}");
                None
            }
            ToolCallIntent::NoCall => None,
        }
    }

    /// The first session whose last listing offers `name`.
    fn route(&self, name: &str) -> Option<&McpSession> {
        self.sessions.iter().find(|s| s.find_tool(name).is_some())
    }

    /// Run one tool request and describe the outcome. Never fails: every
    /// error becomes the observation text.
    async fn dispatch(&self, name: &str, arguments: Map<String, Value>) -> (String, bool) {
        let Some(session) = self.route(name) else {
            warn!(tool = name, "Model requested an unknown tool");
            let available: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
            let listing = if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            };
            return (
                format!("Tool not found: {name}. Available tools: {listing}"),
                true,
            );
        };

        info!(tool = name, server = %session.name(), "Executing tool");
        match session.execute_tool(name, Value::Object(arguments)).await {
            Ok(result) => {
                let mut text = result.text();
                if let Some(progress) = result.progress() {
                    info!(tool = name, "{progress}");
                    text.push('\n');
                    text.push_str(&progress.to_string());
                }
                (text, false)
            }
            Err(e) => {
                warn!(tool = name, "Tool call failed: {e:#}");
                let description = match e.downcast_ref::<McpChatError>() {
                    Some(McpChatError::ToolExecution { message, .. }) => message.clone(),
                    Some(McpChatError::Transport(msg)) => {
                        format!("connection to '{}' failed during the call: {msg}", session.name())
                    }
                    _ => format!("{e:#}"),
                };
                (description, true)
            }
        }
    }

    /// Clean up every session. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        for session in &mut self.sessions {
            session.cleanup().await;
        }
        self.state = LoopState::AwaitingUserInput;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::fake::{FakeReply, FakeServer, FakeServerLog, FakeTransport};
    use crate::providers::{Message, TextStream};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider replaying scripted replies, recording what it was sent.
    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        fallback: String,
        seen: Arc<Mutex<Vec<Vec<Message>>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str], fallback: &str) -> (Arc<Self>, Arc<Mutex<Vec<Vec<Message>>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let provider = Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                fallback: fallback.to_string(),
                seen: Arc::clone(&seen),
            });
            (provider, seen)
        }

        fn next_reply(&self, messages: &[Message]) -> String {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "stub"
        }

        async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Result<String> {
            Ok(self.next_reply(messages))
        }

        async fn chat_stream(
            &self,
            messages: &[Message],
            _options: &ChatOptions,
        ) -> Result<TextStream> {
            let reply = self.next_reply(messages);
            let fragments: Vec<Result<String>> = reply
                .split_inclusive(' ')
                .map(|s| Ok(s.to_string()))
                .collect();
            Ok(Box::pin(tokio_stream::iter(fragments)))
        }
    }

    fn calculator() -> FakeServer {
        FakeServer::new()
            .tool(
                "add",
                "Add two numbers",
                json!({
                    "type": "object",
                    "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
                    "required": ["a", "b"]
                }),
            )
            .on_call(|name, args| match name {
                "add" => FakeReply::text(
                    (args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0)).to_string(),
                ),
                _ => FakeReply::Error {
                    code: -32602,
                    message: format!("Unknown tool: {name}"),
                },
            })
    }

    fn session(name: &str, server: FakeServer) -> (McpSession, FakeServerLog) {
        let (transport, handle) = FakeTransport::new();
        let log = server.spawn(handle);
        let session = McpSession::new(
            name,
            Arc::new(transport),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        (session, log)
    }

    fn settings(max_tool_rounds: usize) -> AgentSettings {
        AgentSettings {
            max_tool_rounds,
            ..AgentSettings::default()
        }
    }

    const ADD_CALL: &str = r#"{"tool": "add", "arguments": {"a": 2, "b": 100}}"#;

    #[tokio::test]
    async fn test_direct_answer_is_final() {
        let (provider, _) = ScriptedProvider::new(&["Hello!"], "unused");
        let (s, log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![s], settings(5));
        agent.start().await.unwrap();

        let answer = agent.respond("hi").await.unwrap();
        assert_eq!(answer, "Hello!");
        assert_eq!(agent.state(), LoopState::FinalAnswer);
        assert!(log.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let (provider, seen) = ScriptedProvider::new(&[ADD_CALL, "The sum is 102."], "unused");
        let (s, log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![s], settings(5));
        agent.start().await.unwrap();

        let answer = agent.respond("use the add tool with 2 and 100").await.unwrap();
        assert_eq!(answer, "The sum is 102.");
        assert_eq!(log.tool_calls(), vec![("add".to_string(), json!({ "a": 2, "b": 100 }))]);

        let seen = seen.lock().unwrap();
        let last = seen[1].last().unwrap();
        assert_eq!(last.role, "system");
        assert_eq!(last.content, "Tool 'add' returned: 102");
        assert!(agent.conversation().check_observations().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_tool_answered_locally() {
        let (provider, seen) = ScriptedProvider::new(
            &[r#"{"tool": "mul", "arguments": {"a": 2}}"#, "Sorry, I cannot multiply."],
            "unused",
        );
        let (s, log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![s], settings(5));
        agent.start().await.unwrap();

        agent.respond("multiply 2 by 3").await.unwrap();
        assert!(log.tool_calls().is_empty());
        let observation = seen.lock().unwrap()[1].last().unwrap().content.clone();
        assert!(observation.starts_with("Tool 'mul' failed: Tool not found: mul"));
        assert!(observation.contains("Available tools: add"));
    }

    #[tokio::test]
    async fn test_dropped_connection_becomes_observation() {
        let server = FakeServer::new()
            .tool("flaky", "Drops the line", json!({ "type": "object" }))
            .on_call(|_, _| FakeReply::Disconnect);
        let (provider, seen) = ScriptedProvider::new(
            &[r#"{"tool": "flaky", "arguments": {}}"#, "The server went away."],
            "unused",
        );
        let (s, log) = session("calc", server);
        let mut agent = Agent::new(provider, vec![s], settings(5));
        agent.start().await.unwrap();

        let answer = agent.respond("try the flaky tool").await.unwrap();
        assert_eq!(answer, "The server went away.");
        assert_eq!(log.tool_calls().len(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let observation = &seen[1].last().unwrap().content;
        assert!(observation.starts_with("Tool 'flaky' failed: connection to 'calc' failed during the call"));
        assert!(agent.conversation().check_observations().is_ok());
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_treated_as_answer() {
        let reply = r#"{"tool": "add", "arguments": {"a": "two", "b": 100}}"#;
        let (provider, _) = ScriptedProvider::new(&[reply], "unused");
        let (s, log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![s], settings(5));
        agent.start().await.unwrap();

        let answer = agent.respond("add two and 100").await.unwrap();
        assert_eq!(answer, reply);
        assert!(log.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_stops_after_max_rounds() {
        let (provider, seen) = ScriptedProvider::new(&[], ADD_CALL);
        let (s, log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![s], settings(3));
        agent.start().await.unwrap();

        let answer = agent.respond("loop forever").await.unwrap();
        assert_eq!(answer, ADD_CALL);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(log.tool_calls().len(), 3);
        assert_eq!(agent.state(), LoopState::FinalAnswer);
    }

    #[tokio::test]
    async fn test_streaming_reports_fragments() {
        let (provider, _) = ScriptedProvider::new(&["The sum is 102."], "unused");
        let (s, _log) = session("calc", calculator());
        let mut agent = Agent::new(
            provider,
            vec![s],
            AgentSettings {
                stream: true,
                ..settings(5)
            },
        );
        agent.start().await.unwrap();

        let mut fragments = Vec::new();
        let answer = agent
            .respond_with("add", |event| {
                if let AgentEvent::Fragment(f) = event {
                    fragments.push(f.to_string());
                }
            })
            .await
            .unwrap();
        assert_eq!(fragments.concat(), answer);
        assert!(fragments.len() > 1);
    }

    #[tokio::test]
    async fn test_start_failure_cleans_up_every_session() {
        let (provider, _) = ScriptedProvider::new(&[], "unused");
        let (ok, ok_log) = session("calc", calculator());
        let (down_transport, down_handle) = FakeTransport::unreachable();
        let down = McpSession::new(
            "down",
            Arc::new(down_transport),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let mut agent = Agent::new(provider, vec![ok, down], settings(5));

        assert!(agent.start().await.is_err());
        assert_eq!(ok_log.close_count(), 1);
        assert_eq!(down_handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_routes_to_first_server_offering_tool() {
        let (provider, _) = ScriptedProvider::new(&[ADD_CALL, "done"], "unused");
        let (first, first_log) = session("first", calculator());
        let (second, second_log) = session("second", calculator());
        let mut agent = Agent::new(provider, vec![first, second], settings(5));
        agent.start().await.unwrap();

        assert_eq!(agent.tools().len(), 1);
        agent.respond("add").await.unwrap();
        assert_eq!(first_log.tool_calls().len(), 1);
        assert!(second_log.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_routes_by_each_session_listing() {
        let (provider, _) = ScriptedProvider::new(&[ADD_CALL, "done"], "unused");
        let echo = FakeServer::new()
            .tool("echo", "Echo text", json!({ "type": "object" }))
            .on_call(|_, args| FakeReply::text(args.to_string()));
        let (first, first_log) = session("echo", echo);
        let (second, second_log) = session("calc", calculator());
        let mut agent = Agent::new(provider, vec![first, second], settings(5));
        agent.start().await.unwrap();

        let names: Vec<&str> = agent.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "add"]);
        assert!(agent.sessions()[1].find_tool("add").is_some());

        agent.respond("add").await.unwrap();
        assert!(first_log.tool_calls().is_empty());
        assert_eq!(second_log.tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_sessions_is_config_error() {
        let (provider, _) = ScriptedProvider::new(&[], "unused");
        let mut agent = Agent::new(provider, Vec::new(), settings(5));
        let err = agent.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpChatError>(),
            Some(McpChatError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_first_call_uses_tool_temperature() {
        struct TemperatureRecorder(Mutex<Vec<Option<f32>>>);

        #[async_trait]
        impl Provider for TemperatureRecorder {
            fn name(&self) -> &str {
                "recorder"
            }
            fn model(&self) -> &str {
                "recorder"
            }
            async fn chat(&self, _m: &[Message], options: &ChatOptions) -> Result<String> {
                let mut seen = self.0.lock().unwrap();
                seen.push(options.temperature);
                Ok(if seen.len() == 1 { ADD_CALL.to_string() } else { "102".to_string() })
            }
            async fn chat_stream(&self, _m: &[Message], _o: &ChatOptions) -> Result<TextStream> {
                unreachable!()
            }
        }

        let recorder = Arc::new(TemperatureRecorder(Mutex::new(Vec::new())));
        let (s, _log) = session("calc", calculator());
        let mut agent = Agent::new(
            recorder.clone(),
            vec![s],
            AgentSettings {
                tool_temperature: Some(0.1),
                ..settings(5)
            },
        );
        agent.start().await.unwrap();
        agent.respond("add").await.unwrap();

        assert_eq!(*recorder.0.lock().unwrap(), vec![Some(0.1), None]);
    }
}
