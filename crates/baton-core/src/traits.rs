use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{AgentTurn, TurnContext};

/// Agent node — one participant in a workflow graph.
///
/// Implementations wrap whatever actually produces the turn (an LLM
/// call, a scripted fixture, a subprocess) behind a single async seam.
pub trait AgentNode: Send + Sync + 'static {
    /// Stable identifier used for registration, routing, and transfer
    /// tool names.
    fn id(&self) -> &str;

    /// Human-readable description, surfaced to peers deciding whether
    /// to hand off to this agent.
    fn description(&self) -> &str {
        ""
    }

    /// Run one turn against an owned snapshot of the workflow context.
    fn turn(&self, ctx: TurnContext) -> BoxFuture<'_, Result<AgentTurn>>;
}
