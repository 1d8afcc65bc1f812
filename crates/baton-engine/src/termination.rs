use baton_core::state::WorkflowState;
use baton_core::types::WorkflowStatus;

/// Should the workflow stop here?
///
/// Two independent signals end a run: an explicit completed status on
/// the state, or the completion marker appearing in the newest
/// agent-authored message. Only the newest agent message is consulted,
/// so a marker buried earlier in the transcript cannot re-trigger
/// termination, and user or tool messages never do. An empty marker
/// disables the scan; only an explicit status ends such a run.
pub fn should_end(state: &WorkflowState, marker: &str) -> bool {
    if state.status == WorkflowStatus::Completed {
        return true;
    }

    if marker.is_empty() {
        return false;
    }

    match state.last_agent_message() {
        Some(message) => message.content.contains(marker),
        None => false,
    }
}
