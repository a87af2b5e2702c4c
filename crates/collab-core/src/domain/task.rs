//! The collaboration task: unit of work tracked by the lifecycle registry.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::role::AgentRole;

/// Opaque key-value payload carried in and out of a task.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// How the participating agents are coordinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    Sequential,
    Parallel,
    Hierarchical,
    Pipeline,
    Consensus,
}

impl CollaborationMode {
    pub const ALL: [CollaborationMode; 5] = [
        CollaborationMode::Sequential,
        CollaborationMode::Parallel,
        CollaborationMode::Hierarchical,
        CollaborationMode::Pipeline,
        CollaborationMode::Consensus,
    ];
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollaborationMode::Sequential => "sequential",
            CollaborationMode::Parallel => "parallel",
            CollaborationMode::Hierarchical => "hierarchical",
            CollaborationMode::Pipeline => "pipeline",
            CollaborationMode::Consensus => "consensus",
        };
        write!(f, "{s}")
    }
}

/// Advisory priority. Stored and reported, never used for scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Task lifecycle state.
///
/// `Pending -> Running -> {Completed, Failed}`; `Pending | Running -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Parameters for creating a [`CollaborationTask`].
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub name: String,
    pub description: String,
    pub mode: CollaborationMode,
    pub roles: Vec<AgentRole>,
    pub input_data: Payload,
    pub priority: TaskPriority,
    pub timeout: Option<TaskTimeout>,
    pub config: Payload,
}

/// Either a budget relative to creation time or an absolute deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskTimeout {
    After(Duration),
    At(DateTime<Utc>),
}

impl TaskRequest {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        mode: CollaborationMode,
        roles: Vec<AgentRole>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mode,
            roles,
            input_data: Payload::new(),
            priority: TaskPriority::default(),
            timeout: None,
            config: Payload::new(),
        }
    }

    pub fn with_input(mut self, input_data: Payload) -> Self {
        self.input_data = input_data;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(TaskTimeout::After(timeout));
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.timeout = Some(TaskTimeout::At(deadline));
        self
    }

    pub fn with_config(mut self, config: Payload) -> Self {
        self.config = config;
        self
    }
}

/// A collaboration task and everything recorded about its execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationTask {
    pub task_id: String,
    pub name: String,
    pub description: String,
    pub mode: CollaborationMode,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub agent_roles: Vec<AgentRole>,
    pub input_data: Payload,
    pub output_data: Payload,
    /// Successful agents only.
    pub results: BTreeMap<String, serde_json::Value>,
    pub errors: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Absolute deadline.
    pub timeout: Option<DateTime<Utc>>,
    pub config: Payload,
}

impl CollaborationTask {
    /// Build a `Pending` task with a fresh id.
    pub fn from_request(request: TaskRequest, now: DateTime<Utc>) -> Self {
        let timeout = request.timeout.map(|t| match t {
            TaskTimeout::At(deadline) => deadline,
            TaskTimeout::After(budget) => chrono::Duration::from_std(budget)
                .ok()
                .and_then(|budget| now.checked_add_signed(budget))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        });

        Self {
            task_id: Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            mode: request.mode,
            priority: request.priority,
            status: TaskStatus::Pending,
            agent_roles: request.roles,
            input_data: request.input_data,
            output_data: Payload::new(),
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            timeout,
            config: request.config,
        }
    }

    /// Whether the absolute deadline has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.timeout.is_some_and(|deadline| now > deadline)
    }

    /// Per-task error budget override from `config["max_errors"]`.
    pub fn max_errors_override(&self) -> Option<u32> {
        self.config
            .get("max_errors")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}
