use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AgentId, WorkflowMessage, WorkflowStatus};

/// What an agent is asking the engine to do after its turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Route to a named node.
    Goto,
    /// Merge a state update, no routing change.
    Update,
    /// A plain reply; routing falls through to the engine.
    Response,
    /// The agent invoked a tool; the transcript carries the result.
    ToolUse,
    /// Finish the workflow successfully.
    End,
    /// Record a failure on the state.
    Error,
    /// Transfer control to another agent.
    Handoff,
}

/// Which graph the target of a command lives in, for nested workflows.
/// A flat workflow only ever uses the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The parent graph, one level up.
    Parent,
    /// The graph the issuing agent runs in.
    #[default]
    #[serde(rename = "self")]
    Current,
    /// A child graph spawned by the issuing agent.
    Child,
    /// Terminate the addressed graph.
    End,
    /// Re-enter the issuing node itself.
    Same,
}

/// A batch of changes to merge into the workflow state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<WorkflowMessage>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: WorkflowMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_artifact(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.artifacts.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.artifacts.is_empty()
            && self.metadata.is_empty()
            && self.status.is_none()
    }
}

/// A routing instruction plus an optional state update, produced by an
/// agent turn and consumed by the engine's merge step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(default = "default_command_id")]
    pub id: String,
    pub kind: CommandKind,
    #[serde(default)]
    pub scope: Scope,
    /// Target node for `Goto` and `Handoff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<StateUpdate>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_command_id() -> String {
    Uuid::new_v4().to_string()
}

impl Command {
    fn new(kind: CommandKind) -> Self {
        Self {
            id: default_command_id(),
            kind,
            scope: Scope::default(),
            goto: None,
            update: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Transfer control to another agent, recording why.
    pub fn handoff(target: impl Into<AgentId>, reason: impl Into<String>) -> Self {
        let mut cmd = Self::new(CommandKind::Handoff);
        cmd.goto = Some(target.into());
        cmd.metadata
            .insert("reason".to_string(), serde_json::Value::String(reason.into()));
        cmd
    }

    /// Route to a named node without the handoff bookkeeping metadata.
    pub fn goto(target: impl Into<AgentId>) -> Self {
        let mut cmd = Self::new(CommandKind::Goto);
        cmd.goto = Some(target.into());
        cmd
    }

    pub fn update(update: StateUpdate) -> Self {
        let mut cmd = Self::new(CommandKind::Update);
        cmd.update = Some(update);
        cmd
    }

    pub fn response() -> Self {
        Self::new(CommandKind::Response)
    }

    pub fn tool_use() -> Self {
        Self::new(CommandKind::ToolUse)
    }

    pub fn end() -> Self {
        Self::new(CommandKind::End)
    }

    /// Record a failure; the merge step appends an error record and marks
    /// the state errored instead of bubbling a hard failure.
    pub fn error(message: impl Into<String>) -> Self {
        let mut cmd = Self::new(CommandKind::Error);
        cmd.metadata
            .insert("message".to_string(), serde_json::Value::String(message.into()));
        cmd
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The handoff reason, when one was recorded.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(|v| v.as_str())
    }

    /// The failure message on an `Error` command.
    pub fn error_message(&self) -> Option<&str> {
        self.metadata.get("message").and_then(|v| v.as_str())
    }

    pub fn is_handoff(&self) -> bool {
        matches!(self.kind, CommandKind::Handoff | CommandKind::Goto)
    }
}
