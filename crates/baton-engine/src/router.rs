use baton_core::handoff::parse_transfer_target;
use baton_core::state::WorkflowState;
use baton_core::types::{AgentId, WorkflowStatus};
use tracing::{debug, warn};

use crate::graph::{CompiledGraph, EntryPoint};

/// Where the workflow goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextNode {
    Agent(AgentId),
    Terminal,
}

/// Which rung of the routing cascade produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTier {
    /// Empty transcript: start at the entry agent.
    Initial,
    /// A pending handoff names the next agent.
    ActiveAgent,
    /// The newest message is a transfer tool result.
    ToolHandoff,
    /// The state is already completed.
    Completed,
    /// No signal; continue with whoever ran last.
    ResumePrevious,
    /// Nothing to go on at all; restart at the entry agent.
    Fallback,
}

impl RouteTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::ActiveAgent => "active_agent",
            Self::ToolHandoff => "tool_handoff",
            Self::Completed => "completed",
            Self::ResumePrevious => "resume_previous",
            Self::Fallback => "fallback",
        }
    }

    /// The last two rungs only fire when every primary signal is absent;
    /// reaching them is worth surfacing.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::ResumePrevious | Self::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub next: NextNode,
    pub tier: RouteTier,
}

impl RouteDecision {
    fn new(next: NextNode, tier: RouteTier) -> Self {
        Self { next, tier }
    }
}

/// Decide the next node from the state alone. Pure: never mutates the
/// state; consuming the pending handoff is the caller's job, so a
/// decision can be recomputed or logged without side effects.
///
/// The cascade, first match wins:
/// 1. empty transcript → entry agent
/// 2. pending `active_agent` that exists in the graph
/// 3. newest message is a `transfer_to_*` tool result naming a known agent
/// 4. completed status → terminal
/// 5. `previous_agent` that exists in the graph → resume it
/// 6. entry agent, or terminal when the graph has no usable entry
///
/// A pending agent that is no longer in the graph logs a warning and
/// falls through instead of failing the run.
pub fn route(state: &WorkflowState, graph: &CompiledGraph) -> RouteDecision {
    if state.messages.is_empty() {
        return RouteDecision::new(entry_next(graph), RouteTier::Initial);
    }

    if let Some(active) = &state.active_agent {
        if graph.contains(active.as_str()) {
            return RouteDecision::new(NextNode::Agent(active.clone()), RouteTier::ActiveAgent);
        }
        warn!(agent = %active, "pending agent is not in the graph, continuing cascade");
    }

    if let Some(message) = state.latest_message() {
        if message.is_tool_result() {
            if let Some(target) = message.tool_name.as_deref().and_then(parse_transfer_target) {
                if graph.contains(target.as_str()) {
                    return RouteDecision::new(NextNode::Agent(target), RouteTier::ToolHandoff);
                }
                warn!(agent = %target, "transfer result targets an unknown agent, continuing cascade");
            }
        }
    }

    if state.status == WorkflowStatus::Completed {
        return RouteDecision::new(NextNode::Terminal, RouteTier::Completed);
    }

    if let Some(previous) = &state.previous_agent {
        if graph.contains(previous.as_str()) {
            debug!(agent = %previous, "no primary routing signal, resuming previous agent");
            return RouteDecision::new(
                NextNode::Agent(previous.clone()),
                RouteTier::ResumePrevious,
            );
        }
    }

    warn!("no routing signal at all, restarting at the entry agent");
    RouteDecision::new(entry_next(graph), RouteTier::Fallback)
}

fn entry_next(graph: &CompiledGraph) -> NextNode {
    match graph.entry() {
        EntryPoint::Agent(agent) => NextNode::Agent(agent.clone()),
        EntryPoint::Noop => NextNode::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use baton_core::config::WorkflowConfig;
    use baton_core::types::{ThreadId, WorkflowMessage};
    use baton_test_utils::ReplyAgent;

    use crate::graph::GraphBuilder;
    use crate::roster::AgentRoster;

    fn graph_of(ids: &[&str]) -> CompiledGraph {
        let mut roster = AgentRoster::new();
        for id in ids {
            roster
                .register(Arc::new(ReplyAgent::new(*id, "ok")))
                .unwrap();
        }
        GraphBuilder::build(&roster, &WorkflowConfig::default()).unwrap()
    }

    fn seeded() -> WorkflowState {
        WorkflowState::initial(&ThreadId::new("t"), "go")
    }

    #[test]
    fn test_empty_transcript_routes_to_entry() {
        let graph = graph_of(&["planner", "developer"]);
        let decision = route(&WorkflowState::new(), &graph);
        assert_eq!(decision.tier, RouteTier::Initial);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("planner")));
    }

    #[test]
    fn test_active_agent_wins() {
        let graph = graph_of(&["planner", "developer"]);
        let mut state = seeded();
        state.active_agent = Some(AgentId::new("developer"));
        state.previous_agent = Some(AgentId::new("planner"));

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ActiveAgent);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("developer")));
        // Pure: the pending handoff is untouched.
        assert_eq!(state.active_agent, Some(AgentId::new("developer")));
        assert_eq!(state.previous_agent, Some(AgentId::new("planner")));
    }

    #[test]
    fn test_unregistered_active_falls_through_to_previous() {
        let graph = graph_of(&["planner", "developer"]);
        let mut state = seeded();
        state.active_agent = Some(AgentId::new("ghost"));
        state.previous_agent = Some(AgentId::new("planner"));

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ResumePrevious);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("planner")));
    }

    #[test]
    fn test_transfer_tool_result_routes_to_target() {
        let graph = graph_of(&["planner", "qa"]);
        let mut state = seeded();
        state.push_message(WorkflowMessage::tool_result("transfer_to_qa", "handing off"));

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ToolHandoff);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("qa")));
    }

    #[test]
    fn test_ordinary_tool_result_is_not_a_handoff() {
        let graph = graph_of(&["planner"]);
        let mut state = seeded();
        state.previous_agent = Some(AgentId::new("planner"));
        state.push_message(WorkflowMessage::tool_result("read_file", "contents"));

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ResumePrevious);
    }

    #[test]
    fn test_transfer_to_unknown_agent_falls_through() {
        let graph = graph_of(&["planner"]);
        let mut state = seeded();
        state.previous_agent = Some(AgentId::new("planner"));
        state.push_message(WorkflowMessage::tool_result("transfer_to_ghost", "gone"));

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ResumePrevious);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("planner")));
    }

    #[test]
    fn test_completed_status_is_terminal() {
        let graph = graph_of(&["planner"]);
        let mut state = seeded();
        state.mark_completed();

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::Completed);
        assert_eq!(decision.next, NextNode::Terminal);
    }

    #[test]
    fn test_pending_handoff_outranks_completed_status() {
        // Cascade order is literal: a pending agent wins even on a
        // completed state. The engine's termination gate, not the
        // router, decides whether the run actually stops.
        let graph = graph_of(&["planner", "developer"]);
        let mut state = seeded();
        state.active_agent = Some(AgentId::new("developer"));
        state.mark_completed();

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::ActiveAgent);
    }

    #[test]
    fn test_no_signal_falls_back_to_entry() {
        let graph = graph_of(&["planner", "developer"]);
        let state = seeded();

        let decision = route(&state, &graph);
        assert_eq!(decision.tier, RouteTier::Fallback);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("planner")));
        assert!(decision.tier.is_fallback());
    }

    #[test]
    fn test_lead_agent_is_preferred_entry() {
        let graph = graph_of(&["planner", "lead", "qa"]);
        let decision = route(&WorkflowState::new(), &graph);
        assert_eq!(decision.next, NextNode::Agent(AgentId::new("lead")));
    }
}
