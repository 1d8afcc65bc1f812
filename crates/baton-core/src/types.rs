use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::Command;
use crate::handoff::HandoffTool;

/// Unique agent identifier within a workflow.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for one workflow run, used as the persistence key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh thread id: the project name plus a random suffix.
    pub fn generate(project: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", project, &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a workflow message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Agent,
    Tool,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

/// A single message in the shared workflow transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<AgentId>,
    pub content: String,
    /// Set on tool messages; transfer results carry the handoff tool name here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::User,
            sender: None,
            recipient: None,
            content: content.into(),
            tool_name: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(sender: impl Into<AgentId>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Agent,
            sender: Some(sender.into()),
            recipient: None,
            content: content.into(),
            tool_name: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Tool,
            sender: None,
            recipient: None,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: None,
            recipient: None,
            content: content.into(),
            tool_name: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<AgentId>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_agent_authored(&self) -> bool {
        self.kind == MessageKind::Agent
    }

    pub fn is_tool_result(&self) -> bool {
        self.kind == MessageKind::Tool
    }
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    InProgress,
    Completed,
    Error,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure captured during a run, kept on the state rather than aborting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(agent: Option<AgentId>, message: impl Into<String>) -> Self {
        Self {
            agent,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything an agent sees for one turn. Owned snapshot: mutating it
/// never touches the live workflow state.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub thread_id: ThreadId,
    /// The message that triggered this turn (latest in the transcript).
    pub incoming: WorkflowMessage,
    pub artifacts: HashMap<String, serde_json::Value>,
    /// Transfer tools this agent may invoke; one per other registered agent.
    pub handoffs: Vec<HandoffTool>,
}

impl TurnContext {
    /// Look up the transfer tool targeting a specific agent, if offered.
    pub fn handoff_to(&self, target: &str) -> Option<&HandoffTool> {
        self.handoffs.iter().find(|t| t.target.as_str() == target)
    }
}

/// What an agent produced in one turn: a transcript message plus an
/// optional command steering the workflow.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub message: WorkflowMessage,
    pub command: Option<Command>,
}

impl AgentTurn {
    pub fn reply(message: WorkflowMessage) -> Self {
        Self {
            message,
            command: None,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_generate_prefixes_project() {
        let id = ThreadId::generate("orchestra");
        assert!(id.as_str().starts_with("orchestra-"));
        assert!(id.as_str().len() > "orchestra-".len());
    }

    #[test]
    fn test_thread_ids_are_unique() {
        let a = ThreadId::generate("p");
        let b = ThreadId::generate("p");
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_constructors() {
        let m = WorkflowMessage::agent("planner", "done").with_recipient("developer");
        assert_eq!(m.kind, MessageKind::Agent);
        assert_eq!(m.sender, Some(AgentId::new("planner")));
        assert_eq!(m.recipient, Some(AgentId::new("developer")));
        assert!(m.is_agent_authored());

        let t = WorkflowMessage::tool_result("transfer_to_developer", "ok");
        assert!(t.is_tool_result());
        assert_eq!(t.tool_name.as_deref(), Some("transfer_to_developer"));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!WorkflowStatus::InProgress.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Error.is_terminal());
        assert_eq!(WorkflowStatus::default(), WorkflowStatus::InProgress);
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let m = WorkflowMessage::user("hi");
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("sender").is_none());
        assert!(json.get("tool_name").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["kind"], "user");
    }

    #[test]
    fn test_handoff_to_finds_offered_tool() {
        let context = TurnContext {
            thread_id: ThreadId::new("t"),
            incoming: WorkflowMessage::user("go"),
            artifacts: HashMap::new(),
            handoffs: vec![
                HandoffTool::for_target(&AgentId::new("developer")),
                HandoffTool::for_target(&AgentId::new("qa")),
            ],
        };

        let tool = context.handoff_to("qa").expect("qa tool offered");
        assert_eq!(tool.name, "transfer_to_qa");
        assert!(context.handoff_to("stranger").is_none());
    }
}
