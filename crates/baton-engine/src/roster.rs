use std::collections::HashMap;
use std::sync::Arc;

use baton_core::error::{BatonError, Result};
use baton_core::traits::AgentNode;
use baton_core::types::AgentId;

/// Registry of available agents, preserving registration order.
///
/// The roster is the mutable source of truth; the graph builder turns it
/// into an immutable snapshot whenever it changes.
#[derive(Default)]
pub struct AgentRoster {
    agents: HashMap<String, Arc<dyn AgentNode>>,
    order: Vec<AgentId>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Ids must be non-empty and unique;
    /// re-registering an existing id is an error rather than a silent
    /// replacement.
    pub fn register(&mut self, agent: Arc<dyn AgentNode>) -> Result<()> {
        let id = agent.id().to_string();
        if id.trim().is_empty() {
            return Err(BatonError::InvalidAgent(id));
        }
        if self.agents.contains_key(&id) {
            return Err(BatonError::DuplicateAgent(id));
        }
        self.order.push(AgentId::new(id.clone()));
        self.agents.insert(id, agent);
        Ok(())
    }

    /// Unregister an agent by id.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.agents.remove(id).is_some() {
            self.order.retain(|a| a.as_str() != id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentNode>> {
        self.agents.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agent ids in registration order.
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
