//! Core data model: roles, tasks, per-run workflow state and errors.

pub mod error;
pub mod role;
pub mod state;
pub mod task;

pub use error::{OrchestratorError, OrchestratorResult};
pub use role::{validate_roles, AgentRole};
pub use state::{AgentOutcome, IntermediateResult, WorkflowState, DEFAULT_MAX_ERRORS};
pub use task::{
    CollaborationMode, CollaborationTask, Payload, TaskPriority, TaskRequest, TaskStatus,
    TaskTimeout,
};
