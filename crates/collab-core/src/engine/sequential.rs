//! SEQUENTIAL: one role at a time, in declared order.
//!
//! Each agent sees the shared context accumulated by the agents before it.
//! Failures are tolerated until the error budget runs out.

use async_trait::async_trait;

use crate::domain::state::WorkflowState;
use crate::domain::task::CollaborationMode;
use crate::engine::executor::{execute_agent, ExecutionContext};
use crate::engine::{checkpoint, EngineRun, ModeOutcome, WorkflowEngine};
use crate::graph::ExecutionPlan;

pub struct SequentialEngine;

#[async_trait]
impl WorkflowEngine for SequentialEngine {
    fn mode(&self) -> CollaborationMode {
        CollaborationMode::Sequential
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        mut state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun {
        for role in plan.roles() {
            if let Some(halt) = checkpoint(&state, ctx) {
                return EngineRun::new(state, halt);
            }
            state = execute_agent(role, state, ctx).await;
            state.current_step += 1;
        }

        let outcome = checkpoint(&state, ctx).unwrap_or(ModeOutcome::Completed);
        EngineRun::new(state, outcome)
    }
}
