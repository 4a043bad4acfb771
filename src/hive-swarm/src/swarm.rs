//! The swarm scheduler.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use hive_common::config::{DependencyFailurePolicy, SwarmSection};
use hive_common::timeout::DEFAULT_MAX_CONCURRENCY;

use crate::context::TaskContext;
use crate::error::{SwarmError, SwarmResult, TaskError};
use crate::graph::DependencyGraph;
use crate::outcome::{SwarmReport, TaskOutcome, TaskTiming};
use crate::signal::{CompletionSignal, CompletionWaiter, completion_signal};

/// Boxed future returned by a task body.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send>>;

type TaskBody<T> = Box<dyn FnOnce(TaskContext<T>) -> TaskFuture<T> + Send>;

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Maximum number of task bodies running at once.
    pub max_concurrency: usize,
    /// Limit on a single body's run time.
    pub task_timeout: Option<Duration>,
    pub on_dependency_failure: DependencyFailurePolicy,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: None,
            on_dependency_failure: DependencyFailurePolicy::Run,
        }
    }
}

impl SwarmConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_dependency_failure(mut self, policy: DependencyFailurePolicy) -> Self {
        self.on_dependency_failure = policy;
        self
    }
}

impl From<&SwarmSection> for SwarmConfig {
    fn from(section: &SwarmSection) -> Self {
        Self {
            max_concurrency: section.max_concurrency.max(1),
            task_timeout: section.task_timeout(),
            on_dependency_failure: section.on_dependency_failure,
        }
    }
}

/// A set of tasks with dependencies, run once with bounded parallelism.
///
/// Tasks are registered with [`register`](Self::register) and run by
/// [`execute`](Self::execute). Each task waits for all of its dependencies
/// to finish (whatever their outcome), then for a concurrency permit, then
/// runs its body. A failing task never stops its siblings.
pub struct Swarm<T> {
    config: SwarmConfig,
    graph: DependencyGraph,
    bodies: HashMap<String, TaskBody<T>>,
    results: Option<HashMap<String, TaskOutcome<T>>>,
    executed: bool,
}

impl<T> fmt::Debug for Swarm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swarm")
            .field("config", &self.config)
            .field("tasks", &self.graph.len())
            .field("executed", &self.executed)
            .finish()
    }
}

impl<T> Default for Swarm<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(SwarmConfig::default())
    }
}

impl<T> Swarm<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            config,
            graph: DependencyGraph::new(),
            bodies: HashMap::new(),
            results: None,
            executed: false,
        }
    }

    pub fn with_max_concurrency(max: usize) -> Self {
        Self::new(SwarmConfig::default().with_max_concurrency(max))
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Register a task.
    ///
    /// Dependencies are not checked here; unknown ids and cycles are
    /// reported by [`execute`](Self::execute). Repeated dependency ids are
    /// collapsed.
    pub fn register<I, S, F, Fut>(
        &mut self,
        id: impl Into<String>,
        dependencies: I,
        body: F,
    ) -> SwarmResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(TaskContext<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        if self.executed {
            return Err(SwarmError::AlreadyExecuted);
        }

        let id = id.into();
        if id.is_empty() {
            return Err(SwarmError::EmptyTaskId);
        }
        if self.graph.contains(&id) {
            return Err(SwarmError::DuplicateTask(id));
        }

        let mut deps: Vec<String> = Vec::new();
        for dep in dependencies {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        debug!(task_id = %id, dependencies = ?deps, "Registered task");
        self.graph.add(id.clone(), deps);
        self.bodies.insert(
            id,
            Box::new(move |ctx: TaskContext<T>| Box::pin(body(ctx)) as TaskFuture<T>),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Registered ids in registration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.ids()
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Run every registered task to completion.
    pub async fn execute(&mut self) -> SwarmResult<SwarmReport> {
        self.execute_with_cancel(CancellationToken::new()).await
    }

    /// Run every registered task, stopping early when `cancel` fires.
    ///
    /// The graph is validated first; nothing runs if a dependency is unknown
    /// or the graph has a cycle. After cancellation every unfinished task is
    /// recorded as [`TaskOutcome::Cancelled`].
    pub async fn execute_with_cancel(
        &mut self,
        cancel: CancellationToken,
    ) -> SwarmResult<SwarmReport> {
        if self.executed {
            return Err(SwarmError::AlreadyExecuted);
        }
        let order = self.graph.topological_sort()?;
        self.executed = true;

        let run_id = Uuid::new_v4();
        let span = info_span!("swarm", %run_id);
        let started = Instant::now();
        info!(
            parent: &span,
            tasks = order.len(),
            max_concurrency = self.config.max_concurrency,
            "Executing swarm"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut signals: HashMap<String, CompletionSignal<T>> = HashMap::new();
        let mut waiters: HashMap<String, CompletionWaiter<T>> = HashMap::new();
        for id in &order {
            let (signal, waiter) = completion_signal();
            signals.insert(id.clone(), signal);
            waiters.insert(id.clone(), waiter);
        }

        let mut join_set = JoinSet::new();
        for id in &order {
            let (Some(body), Some(signal)) = (self.bodies.remove(id), signals.remove(id)) else {
                continue;
            };
            let waits = self
                .graph
                .dependencies(id)
                .unwrap_or_default()
                .iter()
                .filter_map(|dep| waiters.get(dep).map(|w| (dep.clone(), w.clone())))
                .collect();

            let job = Job {
                id: id.clone(),
                body,
                waits,
                semaphore: semaphore.clone(),
                cancel: cancel.clone(),
                timeout: self.config.task_timeout,
                policy: self.config.on_dependency_failure,
            };
            let task_span = info_span!(parent: &span, "task", task_id = %id);
            join_set.spawn(run_task(job, signal).instrument(task_span));
        }
        drop(waiters);

        let mut results = HashMap::with_capacity(order.len());
        let mut report = SwarmReport::new(run_id);

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(record) => {
                    report.record(&record.id, record.outcome.kind(), record.timing);
                    results.insert(record.id, record.outcome);
                }
                Err(e) => warn!(parent: &span, error = %e, "Task join failed"),
            }
        }

        for id in &order {
            if !results.contains_key(id) {
                let outcome = TaskOutcome::Failed("Task aborted before recording an outcome".to_string());
                report.record(id, outcome.kind(), TaskTiming::default());
                results.insert(id.clone(), outcome);
            }
        }

        report.elapsed = started.elapsed();
        report.was_cancelled = cancel.is_cancelled();
        info!(
            parent: &span,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            elapsed = ?report.elapsed,
            "Swarm finished"
        );

        self.results = Some(results);
        Ok(report)
    }

    /// Outcome of every registered task, keyed by id.
    pub fn results(&self) -> SwarmResult<&HashMap<String, TaskOutcome<T>>> {
        self.results.as_ref().ok_or(SwarmError::NotExecuted)
    }

    pub fn result(&self, id: &str) -> Option<&TaskOutcome<T>> {
        self.results.as_ref().and_then(|r| r.get(id))
    }

    pub fn into_results(self) -> SwarmResult<HashMap<String, TaskOutcome<T>>> {
        self.results.ok_or(SwarmError::NotExecuted)
    }
}

struct Job<T> {
    id: String,
    body: TaskBody<T>,
    waits: Vec<(String, CompletionWaiter<T>)>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    policy: DependencyFailurePolicy,
}

struct TaskRecord<T> {
    id: String,
    outcome: TaskOutcome<T>,
    timing: TaskTiming,
}

async fn run_task<T>(job: Job<T>, signal: CompletionSignal<T>) -> TaskRecord<T>
where
    T: Clone + Send + Sync + 'static,
{
    let id = job.id.clone();
    let mut timing = TaskTiming::default();
    let outcome = drive_task(job, &mut timing).await;

    // The permit is already released; dependents may now proceed.
    signal.complete(outcome.clone());

    TaskRecord {
        id,
        outcome,
        timing,
    }
}

async fn drive_task<T>(job: Job<T>, timing: &mut TaskTiming) -> TaskOutcome<T>
where
    T: Clone + Send + Sync + 'static,
{
    let Job {
        id,
        body,
        waits,
        semaphore,
        cancel,
        timeout,
        policy,
    } = job;

    let waiting_since = Instant::now();
    let dependencies = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TaskOutcome::Cancelled,
        deps = wait_for_dependencies(waits) => deps,
    };
    timing.waiting = waiting_since.elapsed();

    if policy == DependencyFailurePolicy::Skip {
        if let Some((dep, _)) = dependencies.iter().find(|(_, o)| !o.is_success()) {
            debug!(dependency = %dep, "Skipping task after dependency failure");
            return TaskOutcome::Skipped {
                dependency: dep.clone(),
            };
        }
    }

    let queued_since = Instant::now();
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TaskOutcome::Cancelled,
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskOutcome::Cancelled,
        },
    };
    timing.queued = queued_since.elapsed();

    debug!("Task started");
    let running_since = Instant::now();
    let ctx = TaskContext::new(
        id,
        dependencies.into_iter().collect(),
        cancel.child_token(),
    );
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => TaskOutcome::Cancelled,
        outcome = run_body(body, ctx, timeout) => outcome,
    };
    timing.running = running_since.elapsed();
    drop(permit);

    match &outcome {
        TaskOutcome::Failed(message) => warn!(error = %message, "Task failed"),
        other => debug!(outcome = ?other.kind(), elapsed = ?timing.running, "Task finished"),
    }
    outcome
}

async fn wait_for_dependencies<T: Clone>(
    waits: Vec<(String, CompletionWaiter<T>)>,
) -> Vec<(String, TaskOutcome<T>)> {
    join_all(waits.into_iter().map(|(id, mut waiter)| async move {
        let outcome = waiter.wait().await;
        (id, outcome)
    }))
    .await
}

async fn run_body<T>(
    body: TaskBody<T>,
    ctx: TaskContext<T>,
    timeout: Option<Duration>,
) -> TaskOutcome<T> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(move || body(ctx))) {
        Ok(future) => future,
        Err(panic) => return TaskOutcome::Failed(panic_message(panic)),
    };
    let guarded = AssertUnwindSafe(future).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => return TaskOutcome::Failed(format!("Task timed out after {limit:?}")),
        },
        None => guarded.await,
    };

    match result {
        Ok(Ok(value)) => TaskOutcome::Succeeded(value),
        Ok(Err(e)) => TaskOutcome::Failed(format!("{e:#}")),
        Err(panic) => TaskOutcome::Failed(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("Task panicked: {detail}")
}
