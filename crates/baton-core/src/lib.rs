pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod handoff;
pub mod state;
pub mod traits;
pub mod types;

pub use command::{Command, CommandKind, Scope, StateUpdate};
pub use config::EngineConfig;
pub use error::{BatonError, Result};
pub use event::{EngineEvent, EventBus};
pub use handoff::{HandoffTool, HandoffToolSet};
pub use state::WorkflowState;
pub use traits::AgentNode;
pub use types::*;
