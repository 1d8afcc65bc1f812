//! Scripted agents and fixtures shared by Baton crate tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use baton_core::command::{Command, StateUpdate};
use baton_core::error::{BatonError, Result};
use baton_core::handoff::transfer_tool_name;
use baton_core::traits::AgentNode;
use baton_core::types::{AgentId, AgentTurn, TurnContext, WorkflowMessage};

/// Install a test subscriber once; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Replies with the same fixed text every turn, no command.
pub struct ReplyAgent {
    id: String,
    reply: String,
}

impl ReplyAgent {
    pub fn new(id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reply: reply.into(),
        }
    }
}

impl AgentNode for ReplyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn(&self, _ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>> {
        Box::pin(async move {
            Ok(AgentTurn::reply(WorkflowMessage::agent(
                self.id.clone(),
                self.reply.clone(),
            )))
        })
    }
}

/// Replies, then hands control to a fixed peer every turn.
pub struct HandoffAgent {
    id: String,
    to: String,
    reason: String,
    note: Option<String>,
}

impl HandoffAgent {
    pub fn new(id: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            to: to.into(),
            reason: "handing off".to_string(),
            note: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl AgentNode for HandoffAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn(&self, ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>> {
        Box::pin(async move {
            let text = self
                .note
                .clone()
                .unwrap_or_else(|| format!("handing off to {}", self.to));
            let message = WorkflowMessage::agent(self.id.clone(), text);
            // Go through the offered transfer tool when there is one, the
            // way a real agent would; fall back to a bare handoff for
            // targets the roster does not offer.
            let command = match ctx.handoff_to(&self.to) {
                Some(tool) => tool.invoke(self.reason.clone()),
                None => Command::handoff(self.to.as_str(), self.reason.clone()),
            };
            Ok(AgentTurn::reply(message).with_command(command))
        })
    }
}

/// Replies once with a farewell and ends the workflow.
pub struct EndingAgent {
    id: String,
    farewell: String,
}

impl EndingAgent {
    pub fn new(id: impl Into<String>, farewell: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            farewell: farewell.into(),
        }
    }
}

impl AgentNode for EndingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn(&self, _ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>> {
        Box::pin(async move {
            let message = WorkflowMessage::agent(self.id.clone(), self.farewell.clone());
            Ok(AgentTurn::reply(message).with_command(Command::end()))
        })
    }
}

/// Fails every turn with the given message.
pub struct FailingAgent {
    id: String,
    message: String,
}

impl FailingAgent {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl AgentNode for FailingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn(&self, _ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>> {
        Box::pin(async move {
            Err(BatonError::Turn {
                agent: self.id.clone(),
                message: self.message.clone(),
            })
        })
    }
}

enum Step {
    Reply(String),
    Handoff { to: String, reason: String },
    ToolTransfer { to: String },
    Update { key: String, value: serde_json::Value, text: String },
    Fail(String),
    End(String),
}

/// Plays a fixed sequence of turns, one step per invocation, and
/// records every context it was handed. Once the script is exhausted
/// it replies inertly.
pub struct ScriptedAgent {
    id: String,
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<TurnContext>>,
}

impl ScriptedAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.push(Step::Reply(text.into()))
    }

    pub fn then_handoff(self, to: impl Into<String>, reason: impl Into<String>) -> Self {
        self.push(Step::Handoff {
            to: to.into(),
            reason: reason.into(),
        })
    }

    /// Emulates an agent that executed its transfer tool: the turn's
    /// command is tool-use and the transcript gains a transfer result.
    pub fn then_tool_transfer(self, to: impl Into<String>) -> Self {
        self.push(Step::ToolTransfer { to: to.into() })
    }

    pub fn then_update(
        self,
        key: impl Into<String>,
        value: serde_json::Value,
        text: impl Into<String>,
    ) -> Self {
        self.push(Step::Update {
            key: key.into(),
            value,
            text: text.into(),
        })
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Step::Fail(message.into()))
    }

    pub fn then_end(self, text: impl Into<String>) -> Self {
        self.push(Step::End(text.into()))
    }

    /// How many turns this agent has taken.
    pub fn turns_taken(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Contexts handed to this agent, in order.
    pub fn seen(&self) -> Vec<TurnContext> {
        self.seen.lock().unwrap().clone()
    }
}

impl AgentNode for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn(&self, ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(ctx);
            let step = self.steps.lock().unwrap().pop_front();

            match step {
                None => Ok(AgentTurn::reply(WorkflowMessage::agent(
                    self.id.clone(),
                    "(script exhausted)",
                ))),
                Some(Step::Reply(text)) => {
                    Ok(AgentTurn::reply(WorkflowMessage::agent(self.id.clone(), text)))
                }
                Some(Step::Handoff { to, reason }) => {
                    let message = WorkflowMessage::agent(
                        self.id.clone(),
                        format!("handing off to {to}"),
                    );
                    Ok(AgentTurn::reply(message)
                        .with_command(Command::handoff(to.as_str(), reason)))
                }
                Some(Step::ToolTransfer { to }) => {
                    let message = WorkflowMessage::agent(
                        self.id.clone(),
                        format!("invoking transfer tool for {to}"),
                    );
                    let tool_name = transfer_tool_name(&AgentId::new(to));
                    let update = StateUpdate::new()
                        .with_message(WorkflowMessage::tool_result(tool_name, "transferred"));
                    Ok(AgentTurn::reply(message)
                        .with_command(Command::tool_use().with_update(update)))
                }
                Some(Step::Update { key, value, text }) => {
                    let update = StateUpdate::new().with_artifact(key, value);
                    Ok(AgentTurn::reply(WorkflowMessage::agent(self.id.clone(), text))
                        .with_command(Command::update(update)))
                }
                Some(Step::Fail(message)) => Err(BatonError::Turn {
                    agent: self.id.clone(),
                    message,
                }),
                Some(Step::End(text)) => {
                    Ok(AgentTurn::reply(WorkflowMessage::agent(self.id.clone(), text))
                        .with_command(Command::end()))
                }
            }
        })
    }
}
