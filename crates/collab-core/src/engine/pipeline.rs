//! PIPELINE: sequential, with each stage's output handed to the next.
//!
//! Before stage `i` runs, a successful stage `i - 1` response is written into
//! the task input as `stage_{i-1}_output`. A failed stage passes nothing on.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::state::{IntermediateResult, WorkflowState};
use crate::domain::task::CollaborationMode;
use crate::engine::executor::{execute_agent, ExecutionContext};
use crate::engine::{checkpoint, EngineRun, ModeOutcome, WorkflowEngine};
use crate::graph::ExecutionPlan;

pub struct PipelineEngine;

/// Input key under which stage `stage`'s response is passed on.
pub fn stage_output_key(stage: usize) -> String {
    format!("stage_{stage}_output")
}

fn thread_stage_output(state: &mut WorkflowState, stage: usize, agent_id: &str) {
    let Some(response) = state
        .intermediate_results
        .get(agent_id)
        .and_then(IntermediateResult::response)
    else {
        return;
    };
    match serde_json::to_value(response) {
        Ok(value) => {
            state.task.input_data.insert(stage_output_key(stage), value);
        }
        Err(e) => warn!(agent_id = %agent_id, error = %e, "stage output not passed on"),
    }
}

#[async_trait]
impl WorkflowEngine for PipelineEngine {
    fn mode(&self) -> CollaborationMode {
        CollaborationMode::Pipeline
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        mut state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun {
        let mut previous: Option<&str> = None;

        for (stage, role) in plan.roles().enumerate() {
            if let Some(halt) = checkpoint(&state, ctx) {
                return EngineRun::new(state, halt);
            }
            if let Some(prev_id) = previous {
                thread_stage_output(&mut state, stage - 1, prev_id);
            }
            state = execute_agent(role, state, ctx).await;
            state.current_step += 1;
            previous = Some(role.agent_id.as_str());
        }

        let outcome = checkpoint(&state, ctx).unwrap_or(ModeOutcome::Completed);
        EngineRun::new(state, outcome)
    }
}
