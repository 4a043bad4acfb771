//! Sandboxed execution of untrusted code units.
//!
//! A [`SandboxRunner`] writes a code unit into a fresh temporary directory,
//! starts the configured [`Interpreter`] on it as a child process in its own
//! process group, captures stdout and stderr separately, and kills the whole
//! group when the configured timeout elapses.
//!
//! ```rust,ignore
//! use hive_sandbox::{Interpreter, SandboxConfig, SandboxRunner};
//!
//! let runner = SandboxRunner::new(SandboxConfig::new(Interpreter::python()));
//! let result = runner.run("print('hi')").await;
//! assert!(result.success);
//! assert_eq!(result.stdout, "hi\n");
//! ```

pub mod capture;
pub mod config;
pub mod env;
pub mod interpreter;
pub mod result;
pub mod runner;

pub use config::SandboxConfig;
pub use interpreter::Interpreter;
pub use result::{LAUNCH_FAILURE_EXIT_CODE, SandboxResult};
pub use runner::SandboxRunner;

use thiserror::Error;

/// Errors that abort a sandbox run.
///
/// Failures of the program itself, and failures to start it, are data in
/// [`SandboxResult`] rather than errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("Sandbox run was cancelled")]
    Cancelled,
}
