pub mod executor;
pub mod graph;
pub mod history;
pub mod roster;
pub mod router;
pub mod termination;

pub use executor::WorkflowRuntime;
pub use graph::{CompiledGraph, EntryPoint, GraphBuilder, NextStep};
pub use history::{HistoryRecord, HistoryStore};
pub use roster::AgentRoster;
pub use router::{route, NextNode, RouteDecision, RouteTier};
pub use termination::should_end;
