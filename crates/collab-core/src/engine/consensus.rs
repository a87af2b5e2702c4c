//! CONSENSUS: a parallel round followed by weighted opinion pooling.
//!
//! The pooled result lands in `shared_context["consensus_result"]` and is
//! copied to the task's `output_data`. With no successful responses at all
//! the run fails; with responses whose weights sum to zero it records the
//! "no valid weights" sentinel and still completes.

use async_trait::async_trait;
use tracing::warn;

use crate::consensus as pooling;
use crate::domain::state::{IntermediateResult, WorkflowState};
use crate::domain::task::CollaborationMode;
use crate::engine::executor::ExecutionContext;
use crate::engine::parallel::run_fan_out;
use crate::engine::{EngineRun, FailureReason, ModeOutcome, WorkflowEngine};
use crate::graph::ExecutionPlan;
use crate::obs;

/// Key of the pooled result in the shared context and task output.
pub const CONSENSUS_RESULT_KEY: &str = "consensus_result";

pub struct ConsensusEngine;

/// Pool the successful responses of `state`, weighted by role.
fn build_consensus(plan: &ExecutionPlan, mut state: WorkflowState) -> EngineRun {
    let (outcome, participants) = {
        let responses: Vec<_> = plan
            .roles()
            .filter_map(|role| {
                state
                    .intermediate_results
                    .get(&role.agent_id)
                    .and_then(IntermediateResult::response)
                    .map(|response| (response, role.weight))
            })
            .collect();
        if responses.is_empty() {
            (None, 0)
        } else {
            (Some(pooling::aggregate(&responses)), responses.len())
        }
    };

    let Some(outcome) = outcome else {
        state.error_count += 1;
        return EngineRun::new(state, ModeOutcome::Failed(FailureReason::NoConsensus));
    };

    obs::emit_consensus_built(
        &state.task.task_id,
        participants,
        outcome.result().map(|r| r.consensus_confidence),
    );

    match serde_json::to_value(&outcome) {
        Ok(value) => {
            state
                .task
                .output_data
                .insert(CONSENSUS_RESULT_KEY.to_string(), value.clone());
            state
                .shared_context
                .insert(CONSENSUS_RESULT_KEY.to_string(), value);
        }
        Err(e) => {
            warn!(error = %e, "consensus result not serializable");
            state.error_count += 1;
            return EngineRun::new(state, ModeOutcome::Failed(FailureReason::NoConsensus));
        }
    }

    let outcome = if state.budget_exhausted() {
        ModeOutcome::Failed(FailureReason::BudgetExhausted)
    } else {
        ModeOutcome::Completed
    };
    EngineRun::new(state, outcome)
}

#[async_trait]
impl WorkflowEngine for ConsensusEngine {
    fn mode(&self) -> CollaborationMode {
        CollaborationMode::Consensus
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun {
        let round = run_fan_out(plan, state, ctx).await;
        match round.outcome {
            ModeOutcome::Completed => build_consensus(plan, round.state),
            _ => round,
        }
    }
}
