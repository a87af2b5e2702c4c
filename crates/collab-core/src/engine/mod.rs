//! Workflow engines: one per [`CollaborationMode`].
//!
//! Every run follows the same shape:
//!
//! ```text
//! initialize -> <mode body> -> aggregate -> finalize | handle_error
//! ```
//!
//! The mode body advances a [`WorkflowState`] through the batches of an
//! [`ExecutionPlan`] and reports how it ended; [`run_workflow`] does the rest.

pub mod consensus;
pub mod executor;
pub mod hierarchical;
pub mod parallel;
pub mod pipeline;
pub mod sequential;

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::domain::state::WorkflowState;
use crate::domain::task::{CollaborationMode, TaskStatus};
use crate::graph::ExecutionPlan;

pub use consensus::ConsensusEngine;
pub use executor::{execute_agent, execute_batch, ExecutionContext};
pub use hierarchical::HierarchicalEngine;
pub use parallel::ParallelEngine;
pub use pipeline::PipelineEngine;
pub use sequential::SequentialEngine;

/// Error key recorded when the task deadline passes mid-run.
pub const TIMEOUT_ERROR_KEY: &str = "timeout";
/// Error key recorded when a run fails without any agent-level error.
pub const WORKFLOW_ERROR_KEY: &str = "workflow";

/// Why a mode body stopped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// `error_count` reached `max_errors`.
    BudgetExhausted,
    DeadlineExceeded,
    /// A concurrent batch came back with fewer results than roles.
    Incomplete,
    /// Consensus had no successful responses to aggregate.
    NoConsensus,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FailureReason::BudgetExhausted => "error budget exhausted",
            FailureReason::DeadlineExceeded => "task execution timeout",
            FailureReason::Incomplete => "not every agent produced a result",
            FailureReason::NoConsensus => "no agent responses to build consensus from",
        };
        f.write_str(msg)
    }
}

/// How a mode body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOutcome {
    Completed,
    Failed(FailureReason),
    /// Cancellation was observed; the caller discards the run.
    Cancelled,
}

/// Result of driving one mode body.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub state: WorkflowState,
    pub outcome: ModeOutcome,
}

impl EngineRun {
    pub fn new(state: WorkflowState, outcome: ModeOutcome) -> Self {
        Self { state, outcome }
    }
}

/// One collaboration mode's execution body.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn mode(&self) -> CollaborationMode;

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun;
}

static SEQUENTIAL: SequentialEngine = SequentialEngine;
static PARALLEL: ParallelEngine = ParallelEngine;
static HIERARCHICAL: HierarchicalEngine = HierarchicalEngine;
static PIPELINE: PipelineEngine = PipelineEngine;
static CONSENSUS: ConsensusEngine = ConsensusEngine;

/// The engine driving `mode`.
pub fn engine_for(mode: CollaborationMode) -> &'static dyn WorkflowEngine {
    match mode {
        CollaborationMode::Sequential => &SEQUENTIAL,
        CollaborationMode::Parallel => &PARALLEL,
        CollaborationMode::Hierarchical => &HIERARCHICAL,
        CollaborationMode::Pipeline => &PIPELINE,
        CollaborationMode::Consensus => &CONSENSUS,
    }
}

/// Checked between steps: cancellation first, then the error budget, then
/// the deadline.
pub fn checkpoint(state: &WorkflowState, ctx: &ExecutionContext) -> Option<ModeOutcome> {
    if ctx.is_cancelled() {
        return Some(ModeOutcome::Cancelled);
    }
    if state.budget_exhausted() {
        return Some(ModeOutcome::Failed(FailureReason::BudgetExhausted));
    }
    if ctx.deadline_passed() {
        return Some(ModeOutcome::Failed(FailureReason::DeadlineExceeded));
    }
    None
}

/// Outcome of a single concurrent batch holding every role of the task.
pub fn fan_in_outcome(state: &WorkflowState, expected: usize, ctx: &ExecutionContext) -> ModeOutcome {
    if let Some(halt) = checkpoint(state, ctx) {
        return halt;
    }
    if state.intermediate_results.len() >= expected {
        ModeOutcome::Completed
    } else {
        ModeOutcome::Failed(FailureReason::Incomplete)
    }
}

/// Drive `state` through `plan` to a terminal status.
///
/// A cancelled run comes back with [`ModeOutcome::Cancelled`] and its task
/// left as it was; the lifecycle manager keeps the CANCELLED record instead.
#[instrument(skip_all, fields(task_id = %plan.task_id, mode = %plan.mode))]
pub async fn run_workflow(
    plan: &ExecutionPlan,
    state: WorkflowState,
    ctx: &ExecutionContext,
) -> EngineRun {
    let engine = engine_for(plan.mode);
    let state = initialize(state);

    let EngineRun { state, outcome } = engine.execute(plan, state, ctx).await;
    debug!(?outcome, error_count = state.error_count, "mode body finished");

    let state = aggregate(state);
    let state = match outcome {
        ModeOutcome::Completed => finalize(state),
        ModeOutcome::Failed(reason) => handle_error(state, reason),
        ModeOutcome::Cancelled => state,
    };
    EngineRun::new(state, outcome)
}

fn initialize(mut state: WorkflowState) -> WorkflowState {
    state.task.status = TaskStatus::Running;
    state.task.started_at.get_or_insert_with(Utc::now);
    state.current_step = 0;
    state
}

/// Fold intermediate results into the task's outputs.
///
/// `output_data` gains `aggregated_results`, `successful_agents`,
/// `failed_agents` and `success_rate` (successes over recorded results).
pub fn aggregate(mut state: WorkflowState) -> WorkflowState {
    let mut aggregated = serde_json::Map::new();
    for (agent_id, result) in &state.intermediate_results {
        match (result.response(), result.error()) {
            (Some(response), _) => match serde_json::to_value(response) {
                Ok(value) => {
                    aggregated.insert(agent_id.clone(), value.clone());
                    state.task.results.insert(agent_id.clone(), value);
                }
                Err(e) => {
                    state
                        .task
                        .errors
                        .insert(agent_id.clone(), format!("unserializable response: {e}"));
                }
            },
            (None, Some(error)) => {
                state.task.errors.insert(agent_id.clone(), error.to_string());
            }
            (None, None) => {}
        }
    }

    let successful = state.successful_agents();
    let failed = state.failed_agents();
    let total = state.intermediate_results.len();
    let success_rate = if total == 0 {
        0.0
    } else {
        successful.len() as f64 / total as f64
    };

    let output = &mut state.task.output_data;
    output.insert(
        "aggregated_results".into(),
        serde_json::Value::Object(aggregated),
    );
    output.insert("successful_agents".into(), serde_json::json!(successful));
    output.insert("failed_agents".into(), serde_json::json!(failed));
    output.insert("success_rate".into(), serde_json::json!(success_rate));
    state
}

fn finalize(mut state: WorkflowState) -> WorkflowState {
    state.task.status = TaskStatus::Completed;
    state.task.completed_at = Some(Utc::now());
    state
}

/// Mark the task FAILED. A failed task always carries at least one error.
fn handle_error(mut state: WorkflowState, reason: FailureReason) -> WorkflowState {
    state.task.status = TaskStatus::Failed;
    state.task.completed_at = Some(Utc::now());
    match reason {
        FailureReason::DeadlineExceeded => {
            state
                .task
                .errors
                .insert(TIMEOUT_ERROR_KEY.to_string(), reason.to_string());
        }
        _ if state.task.errors.is_empty() => {
            state
                .task
                .errors
                .insert(WORKFLOW_ERROR_KEY.to_string(), reason.to_string());
        }
        _ => {}
    }
    state
}
