use std::sync::{Arc, RwLock};

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use baton_core::command::Command;
use baton_core::config::EngineConfig;
use baton_core::error::{BatonError, Result};
use baton_core::event::{EngineEvent, EventBus};
use baton_core::state::WorkflowState;
use baton_core::traits::AgentNode;
use baton_core::types::{
    AgentId, AgentTurn, ThreadId, TurnContext, WorkflowMessage, WorkflowStatus,
};

use crate::graph::{CompiledGraph, EntryPoint, GraphBuilder, NextStep};
use crate::history::HistoryStore;
use crate::roster::AgentRoster;
use crate::router::RouteTier;

/// The workflow runtime — owns the roster, rebuilds the graph on
/// changes, and drives runs over immutable graph snapshots.
///
/// Runs already in flight keep the snapshot they started with; roster
/// edits only affect runs started afterwards.
pub struct WorkflowRuntime {
    config: EngineConfig,
    roster: RwLock<AgentRoster>,
    graph: RwLock<Option<Arc<CompiledGraph>>>,
    event_bus: Arc<EventBus>,
    history: Option<Arc<HistoryStore>>,
    cancel: CancellationToken,
}

impl WorkflowRuntime {
    pub fn new(config: EngineConfig) -> Self {
        let history = if config.history_enabled() {
            config
                .history
                .as_ref()
                .map(|h| Arc::new(HistoryStore::new(h.resolved_dir())))
        } else {
            None
        };

        Self {
            config,
            roster: RwLock::new(AgentRoster::new()),
            graph: RwLock::new(None),
            event_bus: Arc::new(EventBus::default()),
            history,
            cancel: CancellationToken::new(),
        }
    }

    /// Get the event bus for subscribing to run events.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Get a cancellation token for this runtime.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an agent and rebuild the graph.
    pub fn register_agent(&self, agent: Arc<dyn AgentNode>) -> Result<()> {
        let mut roster = self.roster.write().unwrap();
        roster.register(agent)?;
        self.rebuild(&roster);
        Ok(())
    }

    /// Unregister an agent; its transfer tools vanish with it.
    pub fn remove_agent(&self, id: &str) -> bool {
        let mut roster = self.roster.write().unwrap();
        let removed = roster.remove(id);
        if removed {
            self.rebuild(&roster);
        }
        removed
    }

    /// Registered agent ids, in registration order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.roster.read().unwrap().ids().to_vec()
    }

    fn rebuild(&self, roster: &AgentRoster) {
        let graph = GraphBuilder::build(roster, &self.config.workflow).map(Arc::new);
        info!(agents = roster.len(), "Workflow graph rebuilt");
        self.event_bus
            .publish(EngineEvent::GraphRebuilt { agents: roster.len() });
        *self.graph.write().unwrap() = graph;
    }

    fn graph_snapshot(&self) -> Option<Arc<CompiledGraph>> {
        self.graph.read().unwrap().clone()
    }

    /// Run a workflow to completion. Always returns a terminal state;
    /// turn failures are folded into it rather than surfaced as `Err`.
    pub async fn run(&self, input: impl Into<String>) -> WorkflowState {
        let mut cursor = self.cursor(input.into());
        while cursor.running() {
            cursor.advance().await;
        }
        cursor.finalize().await;
        cursor.into_state()
    }

    /// Execute lazily, yielding a state snapshot after every step. The
    /// stream is finite and its final item is the terminal state.
    pub fn stream(&self, input: impl Into<String>) -> BoxStream<'static, WorkflowState> {
        let cursor = self.cursor(input.into());
        Box::pin(futures::stream::unfold(
            (cursor, false),
            |(mut cursor, emitted)| async move {
                if cursor.running() {
                    cursor.advance().await;
                    if !cursor.running() {
                        cursor.finalize().await;
                    }
                    let snapshot = cursor.state.clone();
                    Some((snapshot, (cursor, true)))
                } else if !emitted {
                    // Degenerate runs (nothing to invoke) still yield
                    // their terminal state once.
                    cursor.finalize().await;
                    let snapshot = cursor.state.clone();
                    Some((snapshot, (cursor, true)))
                } else {
                    None
                }
            },
        ))
    }

    /// Seed a run: fresh thread id, initial state, graph snapshot, and
    /// the entry decision. Degenerate rosters terminate here.
    fn cursor(&self, input: String) -> RunCursor {
        let thread_id = ThreadId::generate(&self.config.project.name);
        let mut state = WorkflowState::initial(&thread_id, input);
        let graph = self.graph_snapshot();

        info!(thread_id = %thread_id, "Workflow run starting");
        self.event_bus.publish(EngineEvent::RunStarted {
            thread_id: thread_id.clone(),
        });

        let next = match &graph {
            None => {
                warn!("no agents registered, nothing can run");
                state.record_error(None, "no agents registered; the workflow cannot run");
                None
            }
            Some(graph) => match graph.entry() {
                EntryPoint::Agent(agent) => Some((agent.clone(), RouteTier::Initial)),
                EntryPoint::Noop => {
                    state.push_message(WorkflowMessage::system(
                        "No usable agents are registered; nothing to do.",
                    ));
                    state.mark_completed();
                    None
                }
            },
        };

        RunCursor {
            thread_id,
            state,
            graph,
            next,
            steps: 0,
            max_steps: self.config.workflow.max_steps,
            marker: self.config.workflow.completion_marker.clone(),
            event_bus: self.event_bus.clone(),
            history: self.history.clone(),
            cancel: self.cancel.clone(),
            finalized: false,
        }
    }
}

/// One run's mutable position: the state being built, the graph
/// snapshot it runs over, and the decided next invocation.
struct RunCursor {
    thread_id: ThreadId,
    state: WorkflowState,
    graph: Option<Arc<CompiledGraph>>,
    /// `None` once the run is over.
    next: Option<(AgentId, RouteTier)>,
    steps: usize,
    max_steps: usize,
    marker: String,
    event_bus: Arc<EventBus>,
    history: Option<Arc<HistoryStore>>,
    cancel: CancellationToken,
    finalized: bool,
}

impl RunCursor {
    fn running(&self) -> bool {
        self.next.is_some()
    }

    fn into_state(self) -> WorkflowState {
        self.state
    }

    /// One engine step: apply the routed decision's side effects,
    /// invoke the agent, merge its result, then evaluate the edge.
    async fn advance(&mut self) {
        let Some((agent_id, tier)) = self.next.take() else {
            return;
        };
        let Some(graph) = self.graph.clone() else {
            self.state
                .record_error(None, "workflow graph disappeared mid-run");
            return;
        };

        if self.cancel.is_cancelled() {
            warn!(thread_id = %self.thread_id, "Workflow cancelled");
            self.state
                .record_error(None, BatonError::Cancelled.to_string());
            return;
        }

        if self.steps >= self.max_steps {
            warn!(
                thread_id = %self.thread_id,
                max_steps = self.max_steps,
                "Step budget exhausted, stopping"
            );
            self.state
                .record_error(None, BatonError::MaxStepsExceeded(self.max_steps).to_string());
            return;
        }
        self.steps += 1;

        // Routing side effects land at invocation time, so snapshots
        // taken between steps still show the pending handoff.
        match tier {
            RouteTier::ActiveAgent => {
                self.state.consume_active();
            }
            RouteTier::ToolHandoff => {
                // A transfer tool call behaves like a pending handoff
                // to its target.
                self.state.active_agent = Some(agent_id.clone());
                self.state.consume_active();
            }
            RouteTier::ResumePrevious | RouteTier::Fallback => {
                // Reaching these tiers with a target still set means the
                // router skipped it as unregistered; drop it rather than
                // carrying a dangling handoff forever.
                if let Some(stale) = self.state.active_agent.take() {
                    warn!(agent = %stale, "Dropping handoff target absent from the graph");
                }
                self.event_bus.publish(EngineEvent::RouteFellBack {
                    thread_id: self.thread_id.clone(),
                    tier: tier.as_str().to_string(),
                });
            }
            RouteTier::Initial | RouteTier::Completed => {}
        }

        self.invoke(&graph, &agent_id).await;

        if self.state.status == WorkflowStatus::Error {
            return;
        }

        match graph.next_step(&self.state, &self.marker) {
            NextStep::Finish => {
                if self.state.status == WorkflowStatus::InProgress {
                    self.state.mark_completed();
                }
            }
            NextStep::Invoke { agent, tier } => {
                self.next = Some((agent, tier));
            }
        }
    }

    async fn invoke(&mut self, graph: &CompiledGraph, agent_id: &AgentId) {
        let Some(node) = graph.node(agent_id.as_str()) else {
            // The router only names graph members; losing one here means
            // the snapshot and the decision went out of sync.
            error!(agent = %agent_id, "Routed agent missing from graph snapshot");
            self.state.record_error(
                Some(agent_id.clone()),
                BatonError::AgentNotFound(agent_id.as_str().to_string()).to_string(),
            );
            return;
        };

        let incoming = self
            .state
            .latest_message()
            .cloned()
            .unwrap_or_else(|| WorkflowMessage::user(""));
        let ctx = TurnContext {
            thread_id: self.thread_id.clone(),
            incoming,
            artifacts: self.state.artifacts.clone(),
            handoffs: graph.handoffs_for(agent_id).to_vec(),
        };

        debug!(thread_id = %self.thread_id, agent = %agent_id, step = self.steps, "Executing agent turn");
        self.event_bus.publish(EngineEvent::TurnStarted {
            thread_id: self.thread_id.clone(),
            agent: agent_id.clone(),
            step: self.steps,
        });

        match node.turn(ctx).await {
            Ok(AgentTurn { message, command }) => {
                self.state.push_message(message);
                // The incumbent becomes the previous holder the moment
                // its turn ends; a handoff then moves active on top.
                self.state.previous_agent = Some(agent_id.clone());

                if let Some(command) = &command {
                    if command.is_handoff() {
                        if let Some(to) = &command.goto {
                            info!(from = %agent_id, to = %to, "Handoff requested");
                            self.event_bus.publish(EngineEvent::HandoffRequested {
                                thread_id: self.thread_id.clone(),
                                from: agent_id.clone(),
                                to: to.clone(),
                                reason: command.reason().map(str::to_string),
                            });
                        }
                    }
                    self.state.apply_command(command);
                }

                self.event_bus.publish(EngineEvent::TurnCompleted {
                    thread_id: self.thread_id.clone(),
                    agent: agent_id.clone(),
                    command: command.map(|c| c.kind),
                });
            }
            Err(e) => {
                error!(agent = %agent_id, error = %e, "Agent turn failed");
                self.event_bus.publish(EngineEvent::TurnFailed {
                    thread_id: self.thread_id.clone(),
                    agent: agent_id.clone(),
                    error: e.to_string(),
                });
                // Fold the failure into the state instead of aborting.
                let command = Command::error(e.to_string())
                    .with_metadata("agent", serde_json::json!(agent_id.as_str()));
                self.state.apply_command(&command);
            }
        }
    }

    /// Terminal bookkeeping, once per run: announce the outcome and
    /// persist it when asked to. A failed save never fails the run.
    async fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        info!(
            thread_id = %self.thread_id,
            status = %self.state.status,
            steps = self.steps,
            "Workflow run finished"
        );
        self.event_bus.publish(EngineEvent::RunCompleted {
            thread_id: self.thread_id.clone(),
            status: self.state.status,
            steps: self.steps,
        });

        if self.state.status == WorkflowStatus::Completed {
            if let Some(history) = &self.history {
                match history.save(&self.state).await {
                    Ok(path) => {
                        self.event_bus.publish(EngineEvent::HistorySaved {
                            thread_id: self.thread_id.clone(),
                            path,
                        });
                    }
                    Err(e) => {
                        warn!(thread_id = %self.thread_id, error = %e, "Failed to save run history");
                    }
                }
            }
        }
    }
}
