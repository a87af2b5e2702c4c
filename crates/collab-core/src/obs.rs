//! Structured observability hooks for collaboration task lifecycle events.
//!
//! - Task-scoped tracing spans via [`task_span`]
//! - Emission functions for key events: create, start, finish, cancel,
//!   agent failure, cycle flattening, consensus and cleanup
//!
//! Events go through `tracing`; filtering and formatting are decided by the
//! subscriber installed with [`crate::telemetry::init_tracing`].

use tracing::{info, warn, Span};

use crate::domain::task::{CollaborationMode, TaskStatus};

/// Task-scoped span. Attach it to a run with `tracing::Instrument` so every
/// event inside carries the task id and mode.
pub fn task_span(task_id: &str, mode: CollaborationMode) -> Span {
    tracing::info_span!("collab.task", task_id = %task_id, mode = %mode)
}

pub fn emit_task_created(task_id: &str, name: &str, mode: CollaborationMode, roles: usize) {
    info!(
        event = "task.created",
        task_id = %task_id,
        name = %name,
        mode = %mode,
        roles = roles,
    );
}

pub fn emit_task_started(task_id: &str, mode: CollaborationMode, batches: usize) {
    info!(event = "task.started", task_id = %task_id, mode = %mode, batches = batches);
}

/// Emit event: task reached a terminal status.
pub fn emit_task_finished(
    task_id: &str,
    status: TaskStatus,
    successful: usize,
    failed: usize,
    duration_ms: u64,
) {
    info!(
        event = "task.finished",
        task_id = %task_id,
        status = %status,
        successful = successful,
        failed = failed,
        duration_ms = duration_ms,
    );
}

pub fn emit_task_cancelled(task_id: &str) {
    info!(event = "task.cancelled", task_id = %task_id);
}

/// Emit event: one agent invocation failed (warning level).
pub fn emit_agent_failed(task_id: &str, agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "agent.failed", task_id = %task_id, agent_id = %agent_id, error = %error);
}

/// Emit event: a dependency cycle was flattened into one layer (warning level).
pub fn emit_cycle_flattened(agent_ids: &[String]) {
    warn!(event = "graph.cycle_flattened", agents = ?agent_ids);
}

pub fn emit_consensus_built(task_id: &str, participants: usize, confidence: Option<f64>) {
    info!(
        event = "consensus.built",
        task_id = %task_id,
        participants = participants,
        confidence = ?confidence,
    );
}

pub fn emit_tasks_cleaned(removed: usize, remaining: usize) {
    info!(event = "tasks.cleaned", removed = removed, remaining = remaining);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_span_enters() {
        let span = task_span("test-task-id", CollaborationMode::Sequential);
        let _guard = span.enter();
        emit_task_cancelled("test-task-id");
    }
}
