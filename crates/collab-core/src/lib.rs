//! Collaboration Core Library
//!
//! Coordinates groups of agents on one task: dependency layering, five
//! execution modes, weighted consensus and a task lifecycle registry.

pub mod config;
pub mod consensus;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod graph;
pub mod invoker;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod telemetry;

pub use config::OrchestratorConfig;

pub use consensus::{aggregate as aggregate_consensus, ConsensusOutcome, ConsensusResult};

pub use domain::{
    validate_roles, AgentOutcome, AgentRole, CollaborationMode, CollaborationTask,
    IntermediateResult, OrchestratorError, OrchestratorResult, Payload, TaskPriority,
    TaskRequest, TaskStatus, TaskTimeout, WorkflowState, DEFAULT_MAX_ERRORS,
};

pub use engine::{
    engine_for, run_workflow, EngineRun, ExecutionContext, FailureReason, ModeOutcome,
    WorkflowEngine,
};

pub use graph::{build_layers, ExecutionPlan, RoleGraph, RoleLayers};

pub use invoker::{AgentInvoker, AgentRequest, AgentResponse, InvokeError};

pub use lifecycle::{ExecutionTicket, RegistryCensus, TaskLifecycleManager};

pub use metrics::{Metrics, MetricsSnapshot};

pub use orchestrator::{Orchestrator, OrchestratorMetrics};

pub use telemetry::{init_tracing, LogFormat};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
