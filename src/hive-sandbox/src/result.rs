//! Outcome of a sandbox run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when the process could not be started or was killed
/// by the runner.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// Immutable record of one sandbox run.
///
/// `stdout` and `stderr` hold exactly what the program wrote, up to the
/// configured capture limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// `exit_code == 0` and the run finished within its timeout.
    pub success: bool,
    pub timed_out: bool,
    pub duration: Duration,
    /// Bytes of stdout discarded past the capture limit.
    #[serde(default)]
    pub stdout_truncated: usize,
    /// Bytes of stderr discarded past the capture limit.
    #[serde(default)]
    pub stderr_truncated: usize,
}

impl SandboxResult {
    /// The process could not be started; `message` says why.
    pub fn launch_failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            success: false,
            timed_out: false,
            duration,
            stdout_truncated: 0,
            stderr_truncated: 0,
        }
    }

    /// Output that best explains a failure: stderr, or stdout when the
    /// program reported its error there.
    pub fn error_output(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    pub fn was_truncated(&self) -> bool {
        self.stdout_truncated > 0 || self.stderr_truncated > 0
    }
}
