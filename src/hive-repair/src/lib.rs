//! Self-healing execution of code units.
//!
//! The repair loop runs code in a [`SandboxRunner`](hive_sandbox::SandboxRunner).
//! On failure it classifies the error, asks a caller-supplied [`RepairAgent`]
//! for a corrected version, extracts the code from the agent's reply and runs
//! it again, up to a fixed number of attempts.
//!
//! # Modules
//!
//! - [`agent`]: the agent trait, implemented for async closures
//! - [`diagnose`]: error classification from program output
//! - [`fence`]: code extraction from Markdown-fenced replies
//! - [`prompt`]: the prompt sent to the agent
//! - [`repair_loop`]: the loop itself
//!
//! ```rust,ignore
//! use hive_repair::{AgentError, RepairConfig, RepairLoop};
//! use hive_sandbox::SandboxRunner;
//!
//! let repair = RepairLoop::new(SandboxRunner::default(), RepairConfig::default());
//! let agent = |prompt: String| async move { llm_complete(prompt).await.map_err(AgentError::from) };
//! let outcome = repair.repair("print(undefined)", &agent).await?;
//! println!("{:?} after {} attempts", outcome.status, outcome.attempts);
//! ```

pub mod agent;
pub mod diagnose;
pub mod fence;
pub mod prompt;
pub mod repair_loop;

pub use agent::{AgentError, RepairAgent};
pub use diagnose::{Diagnosis, ErrorKind, diagnose, diagnose_output};
pub use fence::extract_code;
pub use repair_loop::{
    RepairAttempt, RepairConfig, RepairLoop, RepairOutcome, RepairStatus, StopReason, repair,
};

use thiserror::Error;

/// Errors returned instead of a [`RepairOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("max_retries must be at least 1")]
    InvalidMaxRetries,

    #[error("Repair was cancelled")]
    Cancelled,
}

pub type RepairResult<T> = Result<T, RepairError>;

#[cfg(test)]
mod tests;
