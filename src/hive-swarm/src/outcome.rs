//! Task outcomes and run reports.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Final state of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum TaskOutcome<T> {
    /// The body returned a value.
    Succeeded(T),
    /// The body returned an error, panicked or ran past the task timeout.
    Failed(String),
    /// Not run because a dependency did not succeed.
    Skipped { dependency: String },
    /// The swarm was cancelled before the task finished.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            TaskOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Succeeded(_) => OutcomeKind::Succeeded,
            TaskOutcome::Failed(_) => OutcomeKind::Failed,
            TaskOutcome::Skipped { .. } => OutcomeKind::Skipped,
            TaskOutcome::Cancelled => OutcomeKind::Cancelled,
        }
    }
}

/// Outcome without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

/// Where a task spent its time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskTiming {
    /// Waiting for dependencies to complete.
    pub waiting: Duration,
    /// Waiting for a concurrency permit.
    pub queued: Duration,
    /// Running the body.
    pub running: Duration,
}

/// Summary of one swarm execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmReport {
    pub run_id: Uuid,
    pub elapsed: Duration,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Whether the cancellation token fired during the run.
    pub was_cancelled: bool,
    pub timings: HashMap<String, TaskTiming>,
}

impl SwarmReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            elapsed: Duration::ZERO,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            was_cancelled: false,
            timings: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, id: &str, kind: OutcomeKind, timing: TaskTiming) {
        self.total += 1;
        match kind {
            OutcomeKind::Succeeded => self.succeeded += 1,
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Cancelled => self.cancelled += 1,
        }
        self.timings.insert(id.to_string(), timing);
    }

    /// Whether every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    /// Percentage of tasks that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}
