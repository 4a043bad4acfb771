//! Dependency-aware task scheduling with bounded parallelism.
//!
//! A [`Swarm`] holds tasks registered with an id, the ids they depend on and
//! an async body. [`Swarm::execute`] validates the dependency graph, then
//! launches every task at once: each waits for its dependencies' completion
//! signals, takes a permit from the swarm's semaphore, runs its body and
//! publishes its [`TaskOutcome`].
//!
//! # Modules
//!
//! - [`swarm`]: registration and execution
//! - [`graph`]: dependency validation and topological order
//! - [`signal`]: one-shot completion signals
//! - [`context`]: what a task body can see
//! - [`outcome`]: task outcomes and run reports
//!
//! ```rust,ignore
//! use hive_swarm::{NO_DEPS, Swarm};
//!
//! let mut swarm: Swarm<u64> = Swarm::with_max_concurrency(4);
//! swarm.register("a", NO_DEPS, |_| async { Ok(1) })?;
//! swarm.register("b", ["a"], |ctx| async move {
//!     Ok(ctx.dependency_value("a").copied().unwrap_or_default() + 1)
//! })?;
//! swarm.execute().await?;
//! assert_eq!(swarm.result("b").and_then(|o| o.value()), Some(&2));
//! ```

pub mod context;
pub mod error;
pub mod graph;
pub mod outcome;
pub mod signal;
pub mod swarm;

pub use context::TaskContext;
pub use error::{SwarmError, SwarmResult, TaskError};
pub use graph::DependencyGraph;
pub use hive_common::config::DependencyFailurePolicy;
pub use outcome::{OutcomeKind, SwarmReport, TaskOutcome, TaskTiming};
pub use signal::{CompletionSignal, CompletionWaiter, completion_signal};
pub use swarm::{Swarm, SwarmConfig, TaskFuture};

/// Dependency list for a task with no dependencies.
pub const NO_DEPS: [&str; 0] = [];
