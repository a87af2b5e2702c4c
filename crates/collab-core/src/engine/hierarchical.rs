//! HIERARCHICAL: dependency layers, each layer a concurrent batch.
//!
//! A layer starts only after the previous one has fully joined and its
//! results are merged, so every agent sees its dependencies' context.

use async_trait::async_trait;

use crate::domain::state::WorkflowState;
use crate::domain::task::CollaborationMode;
use crate::engine::executor::{execute_batch, ExecutionContext};
use crate::engine::{checkpoint, EngineRun, ModeOutcome, WorkflowEngine};
use crate::graph::ExecutionPlan;

pub struct HierarchicalEngine;

#[async_trait]
impl WorkflowEngine for HierarchicalEngine {
    fn mode(&self) -> CollaborationMode {
        CollaborationMode::Hierarchical
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        mut state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun {
        for layer in &plan.batches {
            if let Some(halt) = checkpoint(&state, ctx) {
                return EngineRun::new(state, halt);
            }
            state = execute_batch(layer, state, ctx).await;
            state.current_step += 1;
        }

        let outcome = checkpoint(&state, ctx).unwrap_or(ModeOutcome::Completed);
        EngineRun::new(state, outcome)
    }
}
