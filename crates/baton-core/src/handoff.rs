use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::types::AgentId;

/// Name prefix shared by every transfer tool.
pub const TRANSFER_PREFIX: &str = "transfer_to_";

/// The canonical tool name targeting an agent.
pub fn transfer_tool_name(target: &AgentId) -> String {
    format!("{TRANSFER_PREFIX}{target}")
}

/// Recover the target agent from a transfer tool name. Returns `None`
/// for names outside the transfer namespace, so arbitrary tool calls
/// can never be misread as handoffs.
pub fn parse_transfer_target(tool_name: &str) -> Option<AgentId> {
    let target = tool_name.strip_prefix(TRANSFER_PREFIX)?;
    if target.is_empty() {
        return None;
    }
    Some(AgentId::new(target))
}

/// A tool an agent can invoke to hand the conversation to a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffTool {
    pub name: String,
    pub target: AgentId,
    pub description: String,
}

impl HandoffTool {
    pub fn for_target(target: &AgentId) -> Self {
        Self {
            name: transfer_tool_name(target),
            target: target.clone(),
            description: format!("Transfer the conversation to the '{target}' agent."),
        }
    }

    /// Invoking the tool produces the handoff command the engine merges.
    pub fn invoke(&self, reason: impl Into<String>) -> Command {
        Command::handoff(self.target.clone(), reason)
    }

    /// JSON schema for the tool's single `reason` parameter, in the shape
    /// LLM tool-calling APIs expect.
    pub fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Why control is being transferred"
                }
            },
            "required": ["reason"]
        })
    }
}

/// Per-agent transfer tools, derived from the current roster. Each agent
/// gets one tool per *other* agent; an agent never sees a transfer tool
/// targeting itself.
#[derive(Debug, Clone, Default)]
pub struct HandoffToolSet {
    tools: HashMap<AgentId, Vec<HandoffTool>>,
}

impl HandoffToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the set for the given roster, in roster order. Entries for
    /// agents no longer present are removed before current ones are added,
    /// so tools derived from a removed agent vanish with it.
    pub fn refresh(&mut self, agents: &[AgentId]) {
        self.tools.clear();
        for agent in agents {
            let peers = agents
                .iter()
                .filter(|a| *a != agent)
                .map(HandoffTool::for_target)
                .collect();
            self.tools.insert(agent.clone(), peers);
        }
    }

    /// Transfer tools offered to one agent; empty for unknown agents.
    pub fn for_agent(&self, agent: &AgentId) -> &[HandoffTool] {
        self.tools.get(agent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
