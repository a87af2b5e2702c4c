//! Public entry point tying the registry, planner and engines together.
//!
//! ```ignore
//! let orchestrator = Orchestrator::with_defaults(Arc::new(my_invoker));
//! let task = orchestrator.create_task(request).await?;
//! let done = orchestrator.execute(&task.task_id).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{instrument, Instrument};

use crate::config::OrchestratorConfig;
use crate::domain::error::OrchestratorResult;
use crate::domain::role::validate_roles;
use crate::domain::state::WorkflowState;
use crate::domain::task::{CollaborationTask, TaskRequest};
use crate::engine::{self, ExecutionContext};
use crate::invoker::AgentInvoker;
use crate::lifecycle::{ExecutionTicket, RegistryCensus, TaskLifecycleManager};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::obs;

/// Reported by [`Orchestrator::get_metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    #[serde(flatten)]
    pub registry: RegistryCensus,
    pub counters: MetricsSnapshot,
}

pub struct Orchestrator {
    invoker: Arc<dyn AgentInvoker>,
    lifecycle: Arc<TaskLifecycleManager>,
    metrics: Arc<Metrics>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new());
        Ok(Self {
            invoker,
            lifecycle: Arc::new(TaskLifecycleManager::new(Arc::clone(&metrics))),
            metrics,
            config,
        })
    }

    pub fn with_defaults(invoker: Arc<dyn AgentInvoker>) -> Self {
        let metrics = Arc::new(Metrics::new());
        Self {
            invoker,
            lifecycle: Arc::new(TaskLifecycleManager::new(Arc::clone(&metrics))),
            metrics,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<TaskLifecycleManager> {
        &self.lifecycle
    }

    /// Validate the role set and register a PENDING task.
    pub async fn create_task(&self, request: TaskRequest) -> OrchestratorResult<CollaborationTask> {
        validate_roles(&request.roles)?;
        let task = CollaborationTask::from_request(request, Utc::now());
        obs::emit_task_created(
            &task.task_id,
            &task.name,
            task.mode,
            task.agent_roles.len(),
        );
        Ok(self.lifecycle.register(task).await)
    }

    /// Run a task to a terminal status and return it.
    ///
    /// Already terminal tasks come back unchanged without invoking anyone.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn execute(&self, task_id: &str) -> OrchestratorResult<CollaborationTask> {
        let (task, plan, cancel) = match self.lifecycle.begin_execution(task_id, Utc::now()).await? {
            ExecutionTicket::Done(task) => return Ok(task),
            ExecutionTicket::Run { task, plan, cancel } => (task, plan, cancel),
        };

        self.metrics.inc_executions_started();
        obs::emit_task_started(&task.task_id, task.mode, plan.batches.len());
        let started = std::time::Instant::now();

        let max_errors = task
            .max_errors_override()
            .filter(|n| *n > 0)
            .unwrap_or(self.config.max_errors);
        let ctx = ExecutionContext::new(
            Arc::clone(&self.invoker),
            self.config.invoke_timeout(),
            task.timeout,
            cancel,
        );
        let span = obs::task_span(&task.task_id, task.mode);
        let run = engine::run_workflow(&plan, WorkflowState::new(task, max_errors), &ctx)
            .instrument(span)
            .await;

        let state = run.state;
        let failed = state.failed_agents().len();
        self.metrics
            .add_agent_results(state.intermediate_results.len() as u64, failed as u64);

        let stored = self.lifecycle.complete_execution(state.task).await;
        obs::emit_task_finished(
            &stored.task_id,
            stored.status,
            stored.results.len(),
            stored.errors.len(),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        Ok(stored)
    }

    pub async fn get_status(&self, task_id: &str) -> Option<CollaborationTask> {
        self.lifecycle.get(task_id).await
    }

    /// Cancel a PENDING or RUNNING task; `false` if unknown or terminal.
    pub async fn cancel(&self, task_id: &str) -> bool {
        self.lifecycle.cancel(task_id, Utc::now()).await
    }

    /// Drop terminal tasks that completed more than `max_age` ago.
    pub async fn cleanup_completed(&self, max_age: Duration) -> usize {
        self.lifecycle.cleanup_completed(max_age, Utc::now()).await
    }

    /// Start the periodic sweep with the configured interval and retention.
    pub fn start_cleanup_sweep(&self) -> JoinHandle<()> {
        self.lifecycle
            .spawn_cleanup_sweep(self.config.sweep_interval(), self.config.retention())
    }

    pub async fn get_metrics(&self) -> OrchestratorMetrics {
        OrchestratorMetrics {
            registry: self.lifecycle.census().await,
            counters: self.metrics.snapshot(),
        }
    }
}
