//! Working memory threaded through one task execution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::{CollaborationTask, Payload};
use crate::invoker::AgentResponse;

/// Default error budget for one execution.
pub const DEFAULT_MAX_ERRORS: u32 = 5;

/// What one agent invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentOutcome {
    Success { response: AgentResponse },
    Failure { error: String },
}

/// One agent's recorded result within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateResult {
    #[serde(flatten)]
    pub outcome: AgentOutcome,
    pub timestamp: DateTime<Utc>,
}

impl IntermediateResult {
    pub fn success(response: AgentResponse, timestamp: DateTime<Utc>) -> Self {
        Self {
            outcome: AgentOutcome::Success { response },
            timestamp,
        }
    }

    pub fn failure(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            outcome: AgentOutcome::Failure {
                error: error.into(),
            },
            timestamp,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AgentOutcome::Success { .. })
    }

    pub fn response(&self) -> Option<&AgentResponse> {
        match &self.outcome {
            AgentOutcome::Success { response } => Some(response),
            AgentOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            AgentOutcome::Success { .. } => None,
            AgentOutcome::Failure { error } => Some(error),
        }
    }
}

/// Engine-owned state for one run of a task.
///
/// Holds its own copy of the task, so concurrent runs never share mutable
/// structures. Branches of a concurrent batch never touch this directly;
/// their results are merged in after the batch joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub task: CollaborationTask,
    pub current_step: usize,
    pub agent_states: BTreeMap<String, serde_json::Value>,
    /// Accumulated agent metadata; last write wins.
    pub shared_context: Payload,
    pub intermediate_results: BTreeMap<String, IntermediateResult>,
    pub error_count: u32,
    pub max_errors: u32,
}

impl WorkflowState {
    pub fn new(task: CollaborationTask, max_errors: u32) -> Self {
        Self {
            task,
            current_step: 0,
            agent_states: BTreeMap::new(),
            shared_context: Payload::new(),
            intermediate_results: BTreeMap::new(),
            error_count: 0,
            max_errors,
        }
    }

    /// `error_count >= max_errors`: no further progress is allowed.
    pub fn budget_exhausted(&self) -> bool {
        self.error_count >= self.max_errors
    }

    /// Record a result; a failure is charged against the error budget.
    pub fn record(&mut self, agent_id: impl Into<String>, result: IntermediateResult) {
        if !result.is_success() {
            self.error_count += 1;
        }
        self.intermediate_results.insert(agent_id.into(), result);
    }

    /// Merge agent metadata into the shared context, overwriting existing keys.
    pub fn merge_context(&mut self, metadata: &Payload) {
        for (key, value) in metadata {
            self.shared_context.insert(key.clone(), value.clone());
        }
    }

    /// Agents with a successful result, in declared role order.
    pub fn successful_agents(&self) -> Vec<String> {
        self.agents_where(true)
    }

    /// Agents with a failed result, in declared role order.
    pub fn failed_agents(&self) -> Vec<String> {
        self.agents_where(false)
    }

    fn agents_where(&self, success: bool) -> Vec<String> {
        self.task
            .agent_roles
            .iter()
            .filter(|role| {
                self.intermediate_results
                    .get(&role.agent_id)
                    .is_some_and(|r| r.is_success() == success)
            })
            .map(|role| role.agent_id.clone())
            .collect()
    }
}
