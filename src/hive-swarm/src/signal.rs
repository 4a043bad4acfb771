//! One-shot, multi-waiter completion signals.

use tokio::sync::watch;

use crate::outcome::TaskOutcome;

/// Setting half of a task's completion signal.
///
/// [`complete`](Self::complete) consumes the signal, so it fires at most once.
#[derive(Debug)]
pub struct CompletionSignal<T> {
    tx: watch::Sender<Option<TaskOutcome<T>>>,
}

/// Waiting half; clone one per dependent.
#[derive(Debug, Clone)]
pub struct CompletionWaiter<T> {
    rx: watch::Receiver<Option<TaskOutcome<T>>>,
}

pub fn completion_signal<T>() -> (CompletionSignal<T>, CompletionWaiter<T>) {
    let (tx, rx) = watch::channel(None);
    (CompletionSignal { tx }, CompletionWaiter { rx })
}

impl<T> CompletionSignal<T> {
    /// Publish the outcome to every current and future waiter.
    pub fn complete(self, outcome: TaskOutcome<T>) {
        // send_replace stores the value even when nobody is waiting yet.
        self.tx.send_replace(Some(outcome));
    }
}

impl<T: Clone> CompletionWaiter<T> {
    /// Wait until the signal is set and return the outcome.
    ///
    /// A signal dropped without being completed reads as a failure.
    pub async fn wait(&mut self) -> TaskOutcome<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => match value.as_ref() {
                Some(outcome) => outcome.clone(),
                None => TaskOutcome::Failed("Task ended without an outcome".to_string()),
            },
            Err(_) => TaskOutcome::Failed("Task ended without an outcome".to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
