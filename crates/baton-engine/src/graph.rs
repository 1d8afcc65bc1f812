use std::collections::HashMap;
use std::sync::Arc;

use baton_core::config::WorkflowConfig;
use baton_core::handoff::{HandoffTool, HandoffToolSet};
use baton_core::state::WorkflowState;
use baton_core::traits::AgentNode;
use baton_core::types::AgentId;
use tracing::{debug, warn};

use crate::roster::AgentRoster;
use crate::router::{route, NextNode, RouteTier};
use crate::termination::should_end;

/// Where a run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    Agent(AgentId),
    /// Agents were registered but none were usable; the run produces a
    /// single explanatory message instead of failing to build.
    Noop,
}

/// The engine's next move after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Invoke { agent: AgentId, tier: RouteTier },
    Finish,
}

/// An immutable snapshot of the workflow graph: usable agent nodes, the
/// transfer tools derived from them, and the chosen entry point.
///
/// Rebuilt from the roster on every registration change; runs already
/// in flight keep the snapshot they started with.
pub struct CompiledGraph {
    nodes: HashMap<String, Arc<dyn AgentNode>>,
    order: Vec<AgentId>,
    entry: EntryPoint,
    handoffs: HandoffToolSet,
}

impl CompiledGraph {
    pub fn node(&self, id: &str) -> Option<Arc<dyn AgentNode>> {
        self.nodes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Usable agent ids in registration order.
    pub fn agent_ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Transfer tools offered to one agent, one per peer.
    pub fn handoffs_for(&self, agent: &AgentId) -> &[HandoffTool] {
        self.handoffs.for_agent(agent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate the conditional edge after a turn: the termination check
    /// decides stop, otherwise the router names the next node.
    pub fn next_step(&self, state: &WorkflowState, marker: &str) -> NextStep {
        if should_end(state, marker) {
            debug!("termination check fired, finishing");
            return NextStep::Finish;
        }

        let decision = route(state, self);
        match decision.next {
            NextNode::Agent(agent) => NextStep::Invoke {
                agent,
                tier: decision.tier,
            },
            NextNode::Terminal => NextStep::Finish,
        }
    }
}

/// Builds a `CompiledGraph` from the roster.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Returns `None` only when the roster is completely empty. Agents
    /// with ids that cannot name a transfer tool are skipped with a
    /// warning rather than failing the build; if that leaves nothing
    /// usable, the graph gets a no-op entry.
    pub fn build(roster: &AgentRoster, config: &WorkflowConfig) -> Option<CompiledGraph> {
        if roster.is_empty() {
            return None;
        }

        let mut nodes = HashMap::new();
        let mut order = Vec::new();

        for id in roster.ids() {
            if !is_valid_node_id(id.as_str()) {
                warn!(agent = %id, "agent id cannot name a transfer tool, skipping node");
                continue;
            }
            match roster.get(id.as_str()) {
                Some(agent) => {
                    nodes.insert(id.as_str().to_string(), agent);
                    order.push(id.clone());
                }
                None => {
                    warn!(agent = %id, "roster entry without an implementation, skipping node");
                }
            }
        }

        let mut handoffs = HandoffToolSet::new();
        handoffs.refresh(&order);

        let entry = match pick_entry(&order, config) {
            Some(agent) => EntryPoint::Agent(agent),
            None => {
                warn!("no usable agents, graph entry is a no-op");
                EntryPoint::Noop
            }
        };

        Some(CompiledGraph {
            nodes,
            order,
            entry,
            handoffs,
        })
    }
}

/// Ids become `transfer_to_<id>` tool names, so they are restricted to
/// the characters tool-calling APIs accept.
fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Entry priority: explicit initial-agent override, then the lead
/// agent, then the first usable agent in registration order.
fn pick_entry(order: &[AgentId], config: &WorkflowConfig) -> Option<AgentId> {
    let find = |name: &str| order.iter().find(|a| a.as_str() == name).cloned();

    if let Some(initial) = &config.initial_agent {
        if let Some(agent) = find(initial) {
            return Some(agent);
        }
        warn!(agent = %initial, "configured initial agent is not registered");
    }

    if let Some(agent) = find(&config.lead_agent) {
        return Some(agent);
    }

    order.first().cloned()
}
