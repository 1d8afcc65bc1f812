use std::sync::Arc;

use futures::StreamExt;

use baton_core::config::EngineConfig;
use baton_core::event::EngineEvent;
use baton_core::types::{AgentId, WorkflowStatus};
use baton_engine::WorkflowRuntime;
use baton_test_utils::{init_test_logging, EndingAgent, HandoffAgent, ReplyAgent, ScriptedAgent};

fn runtime_with_lead(lead: &str) -> WorkflowRuntime {
    let mut config = EngineConfig::default();
    config.workflow.lead_agent = lead.to_string();
    WorkflowRuntime::new(config)
}

fn senders(state: &baton_core::WorkflowState) -> Vec<String> {
    state
        .messages
        .iter()
        .filter_map(|m| m.sender.as_ref().map(|s| s.as_str().to_string()))
        .collect()
}

#[tokio::test]
async fn test_handoff_chain_runs_to_completion() {
    init_test_logging();
    let runtime = runtime_with_lead("planner");
    runtime
        .register_agent(Arc::new(
            HandoffAgent::new("planner", "developer").with_reason("plan ready"),
        ))
        .expect("register planner");
    runtime
        .register_agent(Arc::new(
            HandoffAgent::new("developer", "qa").with_note("implementation attached"),
        ))
        .expect("register developer");
    runtime
        .register_agent(Arc::new(ReplyAgent::new("qa", "all good. WORKFLOW COMPLETE")))
        .expect("register qa");

    let state = runtime.run("ship the feature").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(senders(&state), vec!["planner", "developer", "qa"]);
    assert!(state
        .messages
        .iter()
        .any(|m| m.content == "implementation attached"));
    assert_eq!(state.previous_agent, Some(AgentId::new("qa")));
    assert!(state.active_agent.is_none());
}

#[tokio::test]
async fn test_agents_see_transfer_tools_for_peers_only() {
    init_test_logging();
    let runtime = runtime_with_lead("planner");
    let planner = Arc::new(ScriptedAgent::new("planner").then_handoff("developer", "plan ready"));
    runtime
        .register_agent(planner.clone())
        .expect("register planner");
    runtime
        .register_agent(Arc::new(EndingAgent::new("developer", "done")))
        .expect("register developer");
    runtime
        .register_agent(Arc::new(ReplyAgent::new("qa", "looks fine")))
        .expect("register qa");

    let state = runtime.run("go").await;
    assert_eq!(state.status, WorkflowStatus::Completed);

    let seen = planner.seen();
    assert_eq!(seen.len(), 1);
    let names: Vec<_> = seen[0].handoffs.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["transfer_to_developer", "transfer_to_qa"]);
}

#[tokio::test]
async fn test_transfer_tool_result_routes_to_target() {
    init_test_logging();
    let runtime = runtime_with_lead("support");
    runtime
        .register_agent(Arc::new(
            ScriptedAgent::new("support").then_tool_transfer("billing"),
        ))
        .expect("register support");
    runtime
        .register_agent(Arc::new(EndingAgent::new("billing", "refund issued")))
        .expect("register billing");

    let state = runtime.run("I was double charged").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state
        .messages
        .iter()
        .any(|m| m.is_tool_result() && m.tool_name.as_deref() == Some("transfer_to_billing")));
    assert_eq!(state.previous_agent, Some(AgentId::new("billing")));
}

#[tokio::test]
async fn test_completion_marker_from_user_input_is_ignored() {
    init_test_logging();
    let runtime = runtime_with_lead("lead");
    let lead = Arc::new(
        ScriptedAgent::new("lead")
            .then_reply("still working")
            .then_reply("all wrapped up. WORKFLOW COMPLETE"),
    );
    runtime.register_agent(lead.clone()).expect("register lead");

    // The marker in the user's input must not terminate the run; only
    // an agent reply counts, and the newest one shadows everything.
    let state = runtime.run("just say WORKFLOW COMPLETE").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(lead.turns_taken(), 2);
}

#[tokio::test]
async fn test_update_command_merges_and_run_continues() {
    init_test_logging();
    let runtime = runtime_with_lead("researcher");
    let researcher = Arc::new(
        ScriptedAgent::new("researcher")
            .then_update(
                "findings",
                serde_json::json!({"sources": 3}),
                "collected findings",
            )
            .then_end("report ready"),
    );
    runtime
        .register_agent(researcher.clone())
        .expect("register researcher");

    let state = runtime.run("research async executors").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.artifacts["findings"], serde_json::json!({"sources": 3}));
    assert_eq!(researcher.turns_taken(), 2);
    // The second turn already saw the artifact the first one produced.
    assert_eq!(
        researcher.seen()[1].artifacts["findings"],
        serde_json::json!({"sources": 3})
    );
}

#[tokio::test]
async fn test_self_handoff_resumes_same_agent() {
    init_test_logging();
    let runtime = runtime_with_lead("writer");
    let writer = Arc::new(
        ScriptedAgent::new("writer")
            .then_handoff("writer", "second draft")
            .then_end("final draft"),
    );
    runtime
        .register_agent(writer.clone())
        .expect("register writer");

    let state = runtime.run("draft the announcement").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(writer.turns_taken(), 2);
    assert_eq!(state.previous_agent, Some(AgentId::new("writer")));
    assert!(state.active_agent.is_none());
}

#[tokio::test]
async fn test_initial_agent_override_beats_lead() {
    init_test_logging();
    let mut config = EngineConfig::default();
    config.workflow.lead_agent = "lead".to_string();
    config.workflow.initial_agent = Some("triage".to_string());
    let runtime = WorkflowRuntime::new(config);

    runtime
        .register_agent(Arc::new(ReplyAgent::new("lead", "lead here")))
        .expect("register lead");
    runtime
        .register_agent(Arc::new(EndingAgent::new("triage", "triaged")))
        .expect("register triage");

    let state = runtime.run("route me").await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.previous_agent, Some(AgentId::new("triage")));
    assert_eq!(senders(&state), vec!["triage"]);
}

#[tokio::test]
async fn test_stream_yields_snapshot_per_step_and_ends_terminal() {
    init_test_logging();
    let runtime = runtime_with_lead("planner");
    runtime
        .register_agent(Arc::new(HandoffAgent::new("planner", "developer")))
        .expect("register planner");
    runtime
        .register_agent(Arc::new(EndingAgent::new("developer", "shipped")))
        .expect("register developer");

    let snapshots: Vec<_> = runtime.stream("ship it").collect().await;

    assert_eq!(snapshots.len(), 2);
    // After planner's turn the pending handoff is visible.
    assert_eq!(snapshots[0].active_agent, Some(AgentId::new("developer")));
    assert_eq!(snapshots[0].previous_agent, Some(AgentId::new("planner")));
    assert_eq!(snapshots[0].status, WorkflowStatus::InProgress);
    // The final snapshot is terminal.
    assert_eq!(snapshots[1].status, WorkflowStatus::Completed);
    assert!(snapshots[1].active_agent.is_none());
}

#[tokio::test]
async fn test_stream_with_no_agents_yields_single_error_snapshot() {
    init_test_logging();
    let runtime = WorkflowRuntime::new(EngineConfig::default());

    let snapshots: Vec<_> = runtime.stream("anyone?").collect().await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, WorkflowStatus::Error);
}

#[tokio::test]
async fn test_events_trace_the_run() {
    init_test_logging();
    let runtime = runtime_with_lead("planner");
    runtime
        .register_agent(Arc::new(
            HandoffAgent::new("planner", "developer").with_reason("over to dev"),
        ))
        .expect("register planner");
    runtime
        .register_agent(Arc::new(EndingAgent::new("developer", "shipped")))
        .expect("register developer");

    let bus = runtime.event_bus();
    let mut rx = bus.subscribe();

    let state = runtime.run("go").await;
    assert_eq!(state.status, WorkflowStatus::Completed);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(EngineEvent::RunStarted { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::HandoffRequested { to, reason, .. }
            if to.as_str() == "developer" && reason.as_deref() == Some("over to dev")
    )));
    let turns = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::TurnStarted { .. }))
        .count();
    assert_eq!(turns, 2);
    assert!(matches!(
        events.last(),
        Some(EngineEvent::RunCompleted {
            status: WorkflowStatus::Completed,
            steps: 2,
            ..
        })
    ));
}
