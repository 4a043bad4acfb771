//! Per-task execution context.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::outcome::TaskOutcome;

/// Handed to a task body when it starts.
///
/// Holds the outcomes of the task's declared dependencies, which have all
/// completed by the time the body runs.
#[derive(Debug, Clone)]
pub struct TaskContext<T> {
    id: String,
    dependencies: HashMap<String, TaskOutcome<T>>,
    cancel: CancellationToken,
}

impl<T> TaskContext<T> {
    pub(crate) fn new(
        id: String,
        dependencies: HashMap<String, TaskOutcome<T>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            dependencies,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Outcome of a declared dependency.
    pub fn dependency(&self, id: &str) -> Option<&TaskOutcome<T>> {
        self.dependencies.get(id)
    }

    /// Value of a declared dependency that succeeded.
    pub fn dependency_value(&self, id: &str) -> Option<&T> {
        self.dependency(id).and_then(TaskOutcome::value)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &TaskOutcome<T>)> {
        self.dependencies.iter().map(|(id, outcome)| (id.as_str(), outcome))
    }

    /// Whether every dependency succeeded.
    pub fn all_dependencies_succeeded(&self) -> bool {
        self.dependencies.values().all(TaskOutcome::is_success)
    }

    /// Fires when the swarm is cancelled. Long-running bodies can poll it or
    /// pass it on to cancellable work.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
