//! Orchestrator-level error taxonomy.
//!
//! Only task-level problems are surfaced as `Err`. A failing agent is never
//! an error at this layer: it is recorded as a failed intermediate result and
//! charged against the task's error budget.

/// Errors produced by the collaboration orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task {0} is already running")]
    TaskAlreadyRunning(String),

    #[error("duplicate agent_id in role set: {0}")]
    DuplicateAgent(String),

    #[error("agent {agent_id} depends on unknown agent {dependency}")]
    UnknownDependency { agent_id: String, dependency: String },

    #[error("agent {agent_id} has invalid weight {weight}")]
    InvalidWeight { agent_id: String, weight: f64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
