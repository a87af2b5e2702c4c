//! Task registry and status state machine.
//!
//! The registry is the single owner of every [`CollaborationTask`]. All
//! create, cancel, cleanup and status transitions take one lock; no lock is
//! held while agents run.
//!
//! ```text
//! Pending -> Running -> {Completed, Failed}
//! Pending | Running -> Cancelled
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::task::{CollaborationMode, CollaborationTask, TaskStatus};
use crate::engine::TIMEOUT_ERROR_KEY;
use crate::graph::ExecutionPlan;
use crate::metrics::Metrics;
use crate::obs;

struct TaskEntry {
    task: CollaborationTask,
    cancel: watch::Sender<bool>,
    /// Resolved on first execution and kept until cleanup.
    plan: Option<Arc<ExecutionPlan>>,
    /// A run holds a ticket for this task and has not reported back.
    in_flight: bool,
}

/// What [`TaskLifecycleManager::begin_execution`] decided.
#[derive(Debug)]
pub enum ExecutionTicket {
    /// The task is now RUNNING; drive `plan` and report back through
    /// [`TaskLifecycleManager::complete_execution`].
    Run {
        task: CollaborationTask,
        plan: Arc<ExecutionPlan>,
        cancel: watch::Receiver<bool>,
    },
    /// Nothing to run: the task was already terminal, or its deadline had
    /// passed and it was failed on the spot.
    Done(CollaborationTask),
}

/// Registry-wide counts for metrics reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCensus {
    pub total_tasks: usize,
    /// Tasks with a cached execution plan.
    pub active_workflows: usize,
    /// Every status present, zero-filled.
    pub status_distribution: BTreeMap<TaskStatus, usize>,
    /// Every mode present, zero-filled.
    pub mode_distribution: BTreeMap<CollaborationMode, usize>,
}

pub struct TaskLifecycleManager {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    metrics: Arc<Metrics>,
}

impl TaskLifecycleManager {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Store a freshly created task.
    pub async fn register(&self, task: CollaborationTask) -> CollaborationTask {
        let (cancel, _) = watch::channel(false);
        let snapshot = task.clone();
        self.tasks.lock().await.insert(
            task.task_id.clone(),
            TaskEntry {
                task,
                cancel,
                plan: None,
                in_flight: false,
            },
        );
        self.metrics.inc_tasks_created();
        snapshot
    }

    /// Current snapshot of a task.
    pub async fn get(&self, task_id: &str) -> Option<CollaborationTask> {
        self.tasks
            .lock()
            .await
            .get(task_id)
            .map(|entry| entry.task.clone())
    }

    /// Move a task into RUNNING, or explain why it will not run.
    ///
    /// A terminal task comes back unchanged. A task whose deadline passed
    /// before it started is failed here with a `timeout` error.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn begin_execution(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<ExecutionTicket> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;

        if entry.task.status.is_terminal() {
            return Ok(ExecutionTicket::Done(entry.task.clone()));
        }
        if entry.task.status == TaskStatus::Running {
            return Err(OrchestratorError::TaskAlreadyRunning(task_id.to_string()));
        }
        if entry.task.is_expired(now) {
            entry.task.status = TaskStatus::Failed;
            entry.task.completed_at = Some(now);
            entry.task.errors.insert(
                TIMEOUT_ERROR_KEY.to_string(),
                "task execution timeout".to_string(),
            );
            debug!("deadline passed before start");
            return Ok(ExecutionTicket::Done(entry.task.clone()));
        }

        entry.task.status = TaskStatus::Running;
        entry.task.started_at = Some(now);
        entry.in_flight = true;
        let plan = match &entry.plan {
            Some(plan) => Arc::clone(plan),
            None => {
                let plan = Arc::new(ExecutionPlan::resolve(&entry.task));
                entry.plan = Some(Arc::clone(&plan));
                plan
            }
        };

        Ok(ExecutionTicket::Run {
            task: entry.task.clone(),
            plan,
            cancel: entry.cancel.subscribe(),
        })
    }

    /// Store the outcome of a run and return the task as recorded.
    ///
    /// If the task was cancelled while running, the run's results are
    /// discarded and the CANCELLED record is kept. The returned task is
    /// always terminal.
    pub async fn complete_execution(&self, mut task: CollaborationTask) -> CollaborationTask {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task.task_id) {
            Some(entry) => {
                entry.in_flight = false;
                if entry.task.status != TaskStatus::Cancelled {
                    entry.task = task;
                }
                entry.task.clone()
            }
            // Only a cancelled run can still be non-terminal here.
            None if !task.status.is_terminal() => {
                task.status = TaskStatus::Cancelled;
                task.completed_at.get_or_insert_with(Utc::now);
                task.results.clear();
                task
            }
            None => task,
        }
    }

    /// Cancel a PENDING or RUNNING task. Returns `false` for unknown or
    /// already terminal tasks.
    pub async fn cancel(&self, task_id: &str, now: DateTime<Utc>) -> bool {
        let mut tasks = self.tasks.lock().await;
        let Some(entry) = tasks.get_mut(task_id) else {
            return false;
        };
        if entry.task.status.is_terminal() {
            return false;
        }

        entry.task.status = TaskStatus::Cancelled;
        entry.task.completed_at = Some(now);
        entry.cancel.send_replace(true);
        obs::emit_task_cancelled(task_id);
        true
    }

    /// Remove terminal tasks whose `completed_at` is older than
    /// `now - max_age`, along with their cached plans. Returns the count.
    ///
    /// A task cancelled mid-run stays until its run reports back.
    pub async fn cleanup_completed(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return 0;
        };

        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, entry| {
            let expired = !entry.in_flight
                && entry.task.status.is_terminal()
                && entry.task.completed_at.is_some_and(|at| at < cutoff);
            !expired
        });
        let removed = before - tasks.len();

        self.metrics.add_tasks_cleaned(removed as u64);
        obs::emit_tasks_cleaned(removed, tasks.len());
        removed
    }

    /// Run [`cleanup_completed`](Self::cleanup_completed) every `interval`
    /// until the returned handle is aborted.
    pub fn spawn_cleanup_sweep(
        self: &Arc<Self>,
        interval: Duration,
        retention: Duration,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.cleanup_completed(retention, Utc::now()).await;
                manager.metrics.flush();
            }
        })
    }

    pub async fn census(&self) -> RegistryCensus {
        let tasks = self.tasks.lock().await;

        let mut status_distribution: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut mode_distribution: BTreeMap<CollaborationMode, usize> =
            CollaborationMode::ALL.iter().map(|m| (*m, 0)).collect();
        for entry in tasks.values() {
            *status_distribution.entry(entry.task.status).or_default() += 1;
            *mode_distribution.entry(entry.task.mode).or_default() += 1;
        }

        RegistryCensus {
            total_tasks: tasks.len(),
            active_workflows: tasks.values().filter(|e| e.plan.is_some()).count(),
            status_distribution,
            mode_distribution,
        }
    }
}
