//! The single agent-invocation primitive every mode is built from.
//!
//! [`execute_agent`] runs one role against the live [`WorkflowState`].
//! [`execute_batch`] fans a set of roles out concurrently: every branch works
//! from the same snapshot and writes only to its own result slot, and the
//! slots are merged into the state in declared role order once every branch
//! has joined. Nothing touches the shared state during the fan-out.
//!
//! No retries happen here. Retrying is the invoker's business.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::role::AgentRole;
use crate::domain::state::{IntermediateResult, WorkflowState};
use crate::invoker::{AgentInvoker, AgentRequest, InvokeError};
use crate::obs;

/// Everything an engine needs besides the state it is advancing.
#[derive(Clone)]
pub struct ExecutionContext {
    pub invoker: Arc<dyn AgentInvoker>,
    /// Upper bound on a single invocation.
    pub invoke_timeout: Duration,
    /// Absolute task deadline, if any.
    pub deadline: Option<DateTime<Utc>>,
    /// Flips to `true` when the task is cancelled.
    pub cancel: watch::Receiver<bool>,
}

impl ExecutionContext {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        invoke_timeout: Duration,
        deadline: Option<DateTime<Utc>>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            invoker,
            invoke_timeout,
            deadline,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() > d)
    }

    /// `min(invoke_timeout, time left until the deadline)`.
    fn call_timeout(&self) -> Duration {
        let Some(deadline) = self.deadline else {
            return self.invoke_timeout;
        };
        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        remaining.min(self.invoke_timeout)
    }
}

/// Build the request for `role` from the current state.
pub fn build_request(role: &AgentRole, state: &WorkflowState) -> AgentRequest {
    AgentRequest {
        task_id: state.task.task_id.clone(),
        content: state.task.description.clone(),
        role_name: role.role_name.clone(),
        responsibilities: role.responsibilities.clone(),
        task_input_data: state.task.input_data.clone(),
        shared_context: state.shared_context.clone(),
        correlation_id: Uuid::new_v4(),
    }
}

/// Send one request and classify the reply. Never fails: every problem
/// becomes a failed [`IntermediateResult`].
async fn invoke(
    invoker: &dyn AgentInvoker,
    agent_id: &str,
    request: AgentRequest,
    timeout: Duration,
) -> IntermediateResult {
    let reply = tokio::time::timeout(timeout, invoker.send(agent_id, request)).await;
    let now = Utc::now();

    match reply {
        Err(_) => IntermediateResult::failure(
            InvokeError::Timeout {
                agent_id: agent_id.to_string(),
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .to_string(),
            now,
        ),
        Ok(Err(e)) => IntermediateResult::failure(e.to_string(), now),
        Ok(Ok(None)) => {
            IntermediateResult::failure(format!("agent {agent_id} failed to respond"), now)
        }
        Ok(Ok(Some(response))) if !response.is_well_formed() => IntermediateResult::failure(
            format!(
                "agent {agent_id} returned a malformed response (confidence {})",
                response.confidence
            ),
            now,
        ),
        Ok(Ok(Some(response))) => IntermediateResult::success(response, now),
    }
}

/// Fold one agent's result into the state: record it, charge a failure
/// against the budget, merge a success's metadata into the shared context.
fn apply(state: &mut WorkflowState, agent_id: &str, result: IntermediateResult) {
    match result.response() {
        Some(response) => {
            let metadata = response.metadata.clone();
            state.merge_context(&metadata);
            debug!(agent_id = %agent_id, "agent completed");
        }
        None => {
            obs::emit_agent_failed(
                &state.task.task_id,
                agent_id,
                &result.error().unwrap_or("unknown error"),
            );
        }
    }
    state.record(agent_id, result);
}

/// Run one role against the live state. Used by the one-at-a-time modes.
#[instrument(skip_all, fields(agent_id = %role.agent_id))]
pub async fn execute_agent(
    role: &AgentRole,
    mut state: WorkflowState,
    ctx: &ExecutionContext,
) -> WorkflowState {
    let request = build_request(role, &state);
    let result = invoke(
        ctx.invoker.as_ref(),
        &role.agent_id,
        request,
        ctx.call_timeout(),
    )
    .await;
    apply(&mut state, &role.agent_id, result);
    state
}

/// Invoke every role in `roles` concurrently and merge after all have joined.
///
/// A branch that panics is recorded as a failure for its agent.
#[instrument(skip_all, fields(batch_size = roles.len()))]
pub async fn execute_batch(
    roles: &[AgentRole],
    mut state: WorkflowState,
    ctx: &ExecutionContext,
) -> WorkflowState {
    let timeout = ctx.call_timeout();
    let mut join_set = JoinSet::new();

    for (idx, role) in roles.iter().enumerate() {
        let invoker = Arc::clone(&ctx.invoker);
        let agent_id = role.agent_id.clone();
        let request = build_request(role, &state);
        join_set.spawn(async move {
            let result = invoke(invoker.as_ref(), &agent_id, request, timeout).await;
            (idx, result)
        });
    }

    // Per-branch private slots; the state is untouched until the barrier.
    let mut slots: Vec<Option<IntermediateResult>> = vec![None; roles.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => debug!(error = %e, "agent branch did not complete"),
        }
    }

    for (role, slot) in roles.iter().zip(slots) {
        let result = slot.unwrap_or_else(|| {
            IntermediateResult::failure(
                format!("agent {} execution aborted unexpectedly", role.agent_id),
                Utc::now(),
            )
        });
        apply(&mut state, &role.agent_id, result);
    }

    state
}
