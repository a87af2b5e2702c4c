//! PARALLEL: every role at once, one fan-out and one fan-in.
//!
//! Completes when every role has a recorded result and the error budget is
//! intact.

use async_trait::async_trait;

use crate::domain::state::WorkflowState;
use crate::domain::task::CollaborationMode;
use crate::engine::executor::{execute_batch, ExecutionContext};
use crate::engine::{checkpoint, fan_in_outcome, EngineRun, WorkflowEngine};
use crate::graph::ExecutionPlan;

pub struct ParallelEngine;

/// Run every batch of `plan` concurrently, then apply the fan-in check.
pub(crate) async fn run_fan_out(
    plan: &ExecutionPlan,
    mut state: WorkflowState,
    ctx: &ExecutionContext,
) -> EngineRun {
    if let Some(halt) = checkpoint(&state, ctx) {
        return EngineRun::new(state, halt);
    }
    for batch in &plan.batches {
        state = execute_batch(batch, state, ctx).await;
        state.current_step += 1;
    }
    let outcome = fan_in_outcome(&state, plan.role_count(), ctx);
    EngineRun::new(state, outcome)
}

#[async_trait]
impl WorkflowEngine for ParallelEngine {
    fn mode(&self) -> CollaborationMode {
        CollaborationMode::Parallel
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        state: WorkflowState,
        ctx: &ExecutionContext,
    ) -> EngineRun {
        run_fan_out(plan, state, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::watch;

    use super::*;
    use crate::domain::role::AgentRole;
    use crate::domain::task::{CollaborationTask, TaskRequest};
    use crate::engine::{FailureReason, ModeOutcome};
    use crate::fakes::{Script, ScriptedInvoker};
    use crate::invoker::{AgentResponse, InvokeError};

    fn setup(roles: Vec<AgentRole>, max_errors: u32) -> (ExecutionPlan, WorkflowState) {
        let task = CollaborationTask::from_request(
            TaskRequest::new("t", "d", CollaborationMode::Parallel, roles),
            Utc::now(),
        );
        (ExecutionPlan::resolve(&task), WorkflowState::new(task, max_errors))
    }

    fn slow(content: &str) -> Script {
        Script::Delay(
            Duration::from_millis(50),
            Box::new(Script::Respond(AgentResponse::new(content, 0.6))),
        )
    }

    #[tokio::test]
    async fn test_all_roles_run_concurrently() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .with("a", slow("a"))
                .with("b", slow("b"))
                .with("c", slow("c")),
        );
        let (_tx, rx) = watch::channel(false);
        let ctx = ExecutionContext::new(invoker.clone(), Duration::from_secs(5), None, rx);
        let (plan, state) = setup(
            vec![
                AgentRole::new("a", "x"),
                AgentRole::new("b", "y"),
                AgentRole::new("c", "z"),
            ],
            5,
        );

        let run = ParallelEngine.execute(&plan, state, &ctx).await;
        assert_eq!(run.outcome, ModeOutcome::Completed);
        assert_eq!(run.state.intermediate_results.len(), 3);
        assert_eq!(invoker.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_failures_under_budget_still_complete() {
        let invoker = ScriptedInvoker::new()
            .with("a", Script::Respond(AgentResponse::new("ok", 0.7)))
            .with("b", Script::Fail(InvokeError::Unavailable("b".into())));
        let (_tx, rx) = watch::channel(false);
        let ctx = ExecutionContext::new(Arc::new(invoker), Duration::from_secs(5), None, rx);
        let (plan, state) = setup(vec![AgentRole::new("a", "x"), AgentRole::new("b", "y")], 5);

        let run = ParallelEngine.execute(&plan, state, &ctx).await;
        assert_eq!(run.outcome, ModeOutcome::Completed);
        assert_eq!(run.state.error_count, 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_by_batch_fails() {
        let down = Script::Fail(InvokeError::Unavailable("x".into()));
        let invoker = ScriptedInvoker::new().with("a", down.clone()).with("b", down);
        let (_tx, rx) = watch::channel(false);
        let ctx = ExecutionContext::new(Arc::new(invoker), Duration::from_secs(5), None, rx);
        let (plan, state) = setup(vec![AgentRole::new("a", "x"), AgentRole::new("b", "y")], 2);

        let run = ParallelEngine.execute(&plan, state, &ctx).await;
        assert_eq!(
            run.outcome,
            ModeOutcome::Failed(FailureReason::BudgetExhausted)
        );
    }

    #[tokio::test]
    async fn test_no_roles_completes_immediately() {
        let (_tx, rx) = watch::channel(false);
        let ctx = ExecutionContext::new(
            Arc::new(ScriptedInvoker::new()),
            Duration::from_secs(5),
            None,
            rx,
        );
        let (plan, state) = setup(Vec::new(), 5);
        let run = ParallelEngine.execute(&plan, state, &ctx).await;
        assert_eq!(run.outcome, ModeOutcome::Completed);
    }
}
