//! Atomic counters for orchestrator observability.
//!
//! Each [`Metrics`] is owned by one orchestrator, so independent
//! orchestrators (and tests) never share counts. Call [`Metrics::flush`] to
//! emit current values as a single `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lightweight atomic counters: no allocations, no locking.
#[derive(Debug)]
pub struct Metrics {
    tasks_created: AtomicU64,
    executions_started: AtomicU64,
    agent_invocations: AtomicU64,
    agent_failures: AtomicU64,
    tasks_cleaned: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tasks_created: u64,
    pub executions_started: u64,
    pub agent_invocations: u64,
    pub agent_failures: u64,
    pub tasks_cleaned: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_created: AtomicU64::new(0),
            executions_started: AtomicU64::new(0),
            agent_invocations: AtomicU64::new(0),
            agent_failures: AtomicU64::new(0),
            tasks_cleaned: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks_created(&self) {
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_created", "counter incremented");
    }

    pub fn inc_executions_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "executions_started", "counter incremented");
    }

    /// Add `invocations` agent calls, `failures` of which failed.
    pub fn add_agent_results(&self, invocations: u64, failures: u64) {
        self.agent_invocations
            .fetch_add(invocations, Ordering::Relaxed);
        self.agent_failures.fetch_add(failures, Ordering::Relaxed);
    }

    pub fn add_tasks_cleaned(&self, count: u64) {
        self.tasks_cleaned.fetch_add(count, Ordering::Relaxed);
    }

    /// Emit all current counter values as one `info!` event.
    ///
    /// Call at natural boundaries (end of a sweep, shutdown) rather than on
    /// every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            tasks_created = s.tasks_created,
            executions_started = s.executions_started,
            agent_invocations = s.agent_invocations,
            agent_failures = s.agent_failures,
            tasks_cleaned = s.tasks_cleaned,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            executions_started: self.executions_started.load(Ordering::Relaxed),
            agent_invocations: self.agent_invocations.load(Ordering::Relaxed),
            agent_failures: self.agent_failures.load(Ordering::Relaxed),
            tasks_cleaned: self.tasks_cleaned.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.tasks_created.store(0, Ordering::Relaxed);
        self.executions_started.store(0, Ordering::Relaxed);
        self.agent_invocations.store(0, Ordering::Relaxed);
        self.agent_failures.store(0, Ordering::Relaxed);
        self.tasks_cleaned.store(0, Ordering::Relaxed);
    }
}
