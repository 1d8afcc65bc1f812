use std::path::PathBuf;

use crate::command::CommandKind;
use crate::types::{AgentId, ThreadId, WorkflowStatus};

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A workflow run started.
    RunStarted { thread_id: ThreadId },
    /// An agent turn is about to execute.
    TurnStarted {
        thread_id: ThreadId,
        agent: AgentId,
        step: usize,
    },
    /// An agent turn finished, possibly with a command.
    TurnCompleted {
        thread_id: ThreadId,
        agent: AgentId,
        command: Option<CommandKind>,
    },
    /// An agent turn failed; the failure was folded into the state.
    TurnFailed {
        thread_id: ThreadId,
        agent: AgentId,
        error: String,
    },
    /// An agent asked to transfer control.
    HandoffRequested {
        thread_id: ThreadId,
        from: AgentId,
        to: AgentId,
        reason: Option<String>,
    },
    /// Routing had no primary signal and fell back.
    RouteFellBack { thread_id: ThreadId, tier: String },
    /// The workflow graph was rebuilt after a roster change.
    GraphRebuilt { agents: usize },
    /// A run reached a terminal state.
    RunCompleted {
        thread_id: ThreadId,
        status: WorkflowStatus,
        steps: usize,
    },
    /// Final state was persisted to disk.
    HistorySaved { thread_id: ThreadId, path: PathBuf },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::GraphRebuilt { agents: 3 });

        match rx.recv().await.unwrap() {
            EngineEvent::GraphRebuilt { agents } => assert_eq!(agents, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::RunStarted {
            thread_id: ThreadId::new("t"),
        });
    }
}
