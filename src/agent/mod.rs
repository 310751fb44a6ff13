use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::history::{History, Message};
use crate::llm::{self, LlmBackend, ModelRequest, prompts};
use crate::tools::{self, ToolContext, ToolDeclaration, ToolRegistry, Workspace};

const EVENT_CHANNEL_CAPACITY: usize = 64;

const TURNS_EXHAUSTED_REPLY: &str =
    "I ran out of tool-call turns before finishing. Ask me to continue if you need more.";

/// Progress notifications published while a turn runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking {
        session_id: String,
        turn: usize,
    },
    /// Text the model produced alongside tool calls.
    AssistantText {
        session_id: String,
        text: String,
    },
    ToolStart {
        session_id: String,
        call_id: String,
        tool: String,
        arguments: String,
    },
    ToolResult {
        session_id: String,
        call_id: String,
        tool: String,
        success: bool,
        output_preview: String,
    },
    TurnComplete {
        session_id: String,
        model_turns: usize,
        tool_calls: usize,
        elapsed_ms: u64,
    },
}

/// Process-wide pieces shared by every session: the model, the tools, and
/// the event channel.
pub struct Agent {
    pub config: Config,
    pub tools: ToolRegistry,
    pub llm: Arc<dyn LlmBackend>,
    pub ctx: ToolContext,
    instructions: String,
    declarations: Vec<ToolDeclaration>,
    events: broadcast::Sender<AgentEvent>,
}

impl Agent {
    /// Build the tool registry and model backend from config.
    pub fn from_config(config: Config) -> Result<Self> {
        let tools = tools::build_registry(&config)?;
        let llm = llm::build_backend(&config)?;
        Self::new(config, tools, llm)
    }

    pub fn new(config: Config, tools: ToolRegistry, llm: Arc<dyn LlmBackend>) -> Result<Self> {
        let workspace = Workspace::new(config.workspace_root(), config.workspace.confine)?;

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("file-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to create HTTP client: {e}")))?;

        let instructions = prompts::system_prompt(&config.instructions, &config.agent_name, &tools.names());
        let declarations = tools.declarations();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            workspace = %workspace.root().display(),
            confined = workspace.is_confined(),
            tools = tools.len(),
            backend = llm.name(),
            model = llm.model(),
            "agent initialized"
        );

        Ok(Self {
            config,
            tools,
            llm,
            ctx: ToolContext {
                workspace,
                http_client,
            },
            instructions,
            declarations,
            events,
        })
    }

    /// Start a fresh session whose history holds only the system instruction.
    pub fn session(self: &Arc<Self>, id: impl Into<String>) -> Session {
        Session {
            id: id.into(),
            agent: Arc::clone(self),
            history: History::with_system(self.instructions.clone()),
            state: SessionState::AwaitingUser,
        }
    }

    /// Subscribe to progress events from every session.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingUser,
    AwaitingModel,
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Assistant text of the final model response (may be empty).
    pub reply: String,
    /// Number of model requests made during the turn.
    pub model_turns: usize,
    /// Number of tool calls executed during the turn.
    pub tool_calls: usize,
}

/// One conversation: owns its history and drives the dispatch loop.
pub struct Session {
    id: String,
    agent: Arc<Agent>,
    history: History,
    state: SessionState,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run one user turn to completion, chaining tool calls until the model
    /// answers in plain text.
    ///
    /// A transport failure ends the turn with `Err`; whatever was appended to
    /// the history before the failure stays there and the session remains
    /// usable.
    pub async fn submit(&mut self, user_text: &str) -> Result<TurnOutcome> {
        debug_assert_eq!(self.state(), SessionState::AwaitingUser);
        let started = Instant::now();
        self.history.push(Message::user(user_text));
        self.state = SessionState::AwaitingModel;

        let outcome = self.run_until_reply().await;
        self.state = SessionState::AwaitingUser;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(turn) => {
                info!(
                    session_id = %self.id,
                    reply_len = turn.reply.len(),
                    model_turns = turn.model_turns,
                    tool_calls = turn.tool_calls,
                    history_len = self.history.len(),
                    elapsed_ms,
                    "turn complete"
                );
                self.agent.emit(AgentEvent::TurnComplete {
                    session_id: self.id.clone(),
                    model_turns: turn.model_turns,
                    tool_calls: turn.tool_calls,
                    elapsed_ms,
                });
            }
            Err(e) => {
                warn!(session_id = %self.id, err = %e, elapsed_ms, "turn failed");
            }
        }

        outcome
    }

    async fn run_until_reply(&mut self) -> Result<TurnOutcome> {
        let max_tool_turns = self.agent.config.max_tool_turns;
        let mut tool_calls = 0;
        let mut turn = 0usize;

        loop {
            if max_tool_turns > 0 && turn >= max_tool_turns {
                warn!(session_id = %self.id, max_tool_turns, "tool-call turn limit reached");
                return Ok(TurnOutcome {
                    reply: TURNS_EXHAUSTED_REPLY.to_string(),
                    model_turns: turn,
                    tool_calls,
                });
            }

            debug!(session_id = %self.id, turn, "requesting model turn");
            self.agent.emit(AgentEvent::Thinking {
                session_id: self.id.clone(),
                turn,
            });

            let request = ModelRequest {
                history: &self.history,
                tools: &self.agent.declarations,
            };
            let response = self.agent.llm.respond(&request).await?;

            self.history.extend(response.to_messages());

            if !response.has_function_calls() {
                return Ok(TurnOutcome {
                    reply: response.joined_text(),
                    model_turns: turn + 1,
                    tool_calls,
                });
            }

            let interim = response.joined_text();
            if !interim.is_empty() {
                self.agent.emit(AgentEvent::AssistantText {
                    session_id: self.id.clone(),
                    text: interim,
                });
            }

            for call in response.function_calls() {
                info!(
                    session_id = %self.id,
                    tool = %call.name,
                    call_id = %call.call_id,
                    "model requested tool call"
                );
                self.agent.emit(AgentEvent::ToolStart {
                    session_id: self.id.clone(),
                    call_id: call.call_id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                });

                let result = self.agent.tools.dispatch(call, &self.agent.ctx).await;
                tool_calls += 1;

                self.agent.emit(AgentEvent::ToolResult {
                    session_id: self.id.clone(),
                    call_id: result.call_id.clone(),
                    tool: call.name.clone(),
                    success: result.success,
                    output_preview: truncate_preview(&result.output, 200),
                });

                self.history.push(Message::FunctionResult {
                    call_id: result.call_id,
                    output: result.output,
                });
            }

            turn += 1;
        }
    }
}

/// Truncate a string to `max_len` bytes, appending "…" if truncated.
fn truncate_preview(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
