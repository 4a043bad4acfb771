//! Swarm errors.

use thiserror::Error;

/// Error returned by a task body. Any error type converts into it with `?`.
pub type TaskError = anyhow::Error;

/// Errors from registering or executing a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwarmError {
    #[error("Task id must not be empty")]
    EmptyTaskId,

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task {task} depends on unregistered task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    /// The path starts and ends with the same task.
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("Swarm has already been executed")]
    AlreadyExecuted,

    #[error("Swarm has not been executed yet")]
    NotExecuted,
}

pub type SwarmResult<T> = Result<T, SwarmError>;
