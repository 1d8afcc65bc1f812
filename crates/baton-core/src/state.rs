use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::{Command, CommandKind, StateUpdate};
use crate::types::{AgentId, ErrorRecord, ThreadId, WorkflowMessage, WorkflowStatus};

/// Metadata key holding the run's thread id.
pub const META_THREAD_ID: &str = "thread_id";
/// Metadata key holding the run's creation timestamp (RFC 3339).
pub const META_CREATED_AT: &str = "created_at";

/// The single shared state threaded through every agent turn.
///
/// Messages only ever grow; artifacts and metadata merge per key with
/// newer values winning. `active_agent` and `previous_agent` together
/// drive routing: when both are set they are never equal, so a crashed
/// handoff can always fall back to the previous holder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub messages: Vec<WorkflowMessage>,
    /// Agent the workflow should route to next, when a handoff is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<AgentId>,
    /// Agent that most recently held control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_agent: Option<AgentId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorRecord>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the state for a fresh run: the user's input as the first
    /// message, plus thread id and creation time in metadata.
    pub fn initial(thread_id: &ThreadId, input: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.messages.push(WorkflowMessage::user(input));
        state.metadata.insert(
            META_THREAD_ID.to_string(),
            serde_json::Value::String(thread_id.as_str().to_string()),
        );
        state.metadata.insert(
            META_CREATED_AT.to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
        state
    }

    /// The run's thread id, if this state was seeded by `initial`.
    pub fn thread_id(&self) -> Option<&str> {
        self.metadata.get(META_THREAD_ID).and_then(|v| v.as_str())
    }

    pub fn push_message(&mut self, message: WorkflowMessage) {
        self.messages.push(message);
    }

    pub fn latest_message(&self) -> Option<&WorkflowMessage> {
        self.messages.last()
    }

    /// Newest agent-authored message, scanning backwards.
    pub fn last_agent_message(&self) -> Option<&WorkflowMessage> {
        self.messages.iter().rev().find(|m| m.is_agent_authored())
    }

    /// Clear the pending handoff target, remembering it as the previous
    /// holder. Called by the engine exactly once per routed handoff, so a
    /// stale target can never be consumed twice.
    pub fn consume_active(&mut self) -> Option<AgentId> {
        let agent = self.active_agent.take()?;
        self.previous_agent = Some(agent.clone());
        Some(agent)
    }

    /// Merge a state update: messages append, artifacts and metadata
    /// overwrite per key, an explicit status wins.
    pub fn apply_update(&mut self, update: &StateUpdate) {
        self.messages.extend(update.messages.iter().cloned());
        for (k, v) in &update.artifacts {
            self.artifacts.insert(k.clone(), v.clone());
        }
        for (k, v) in &update.metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }

    /// Merge a command into the state. The update lands first, then the
    /// command's own effect (routing fields, terminal status, error record).
    pub fn apply_command(&mut self, command: &Command) {
        if let Some(update) = &command.update {
            self.apply_update(update);
        }

        match command.kind {
            CommandKind::Handoff | CommandKind::Goto => match &command.goto {
                Some(target) => self.apply_handoff(target.clone()),
                None => {
                    warn!(kind = ?command.kind, "routing command without a target, ignoring");
                }
            },
            CommandKind::End => {
                self.status = WorkflowStatus::Completed;
            }
            CommandKind::Error => {
                let message = command
                    .error_message()
                    .unwrap_or("agent turn failed")
                    .to_string();
                let agent = command
                    .metadata
                    .get("agent")
                    .and_then(|v| v.as_str())
                    .map(AgentId::from);
                self.record_error(agent, message);
            }
            CommandKind::Update | CommandKind::Response | CommandKind::ToolUse => {}
        }
    }

    fn apply_handoff(&mut self, target: AgentId) {
        match self.active_agent.take() {
            // Self-handoff: the agent keeps control, no shuffle.
            Some(prior) if prior == target => {
                self.active_agent = Some(prior);
            }
            Some(prior) => {
                self.previous_agent = Some(prior);
                self.active_agent = Some(target);
            }
            None => {
                // The previous holder handing control back to itself is
                // also a self-handoff; leaving active unset lets routing
                // resume it without ever holding active == previous.
                if self.previous_agent.as_ref() != Some(&target) {
                    self.active_agent = Some(target);
                }
            }
        }
    }

    /// Append an error record and mark the run errored.
    pub fn record_error(&mut self, agent: Option<AgentId>, message: impl Into<String>) {
        self.errors.push(ErrorRecord::new(agent, message));
        self.status = WorkflowStatus::Error;
    }

    pub fn mark_completed(&mut self) {
        self.status = WorkflowStatus::Completed;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
