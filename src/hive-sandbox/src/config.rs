//! Sandbox runner configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use hive_common::config::SandboxSection;
use hive_common::timeout::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_SANDBOX_TIMEOUT_SECS};
use serde::Serialize;

use crate::interpreter::Interpreter;

/// Configuration for a [`SandboxRunner`](crate::SandboxRunner).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxConfig {
    pub interpreter: Interpreter,
    /// Wall-clock limit for one run.
    pub timeout: Duration,
    /// Bytes kept per output stream; the rest is drained and counted.
    pub max_output_bytes: usize,
    /// Parent directory for per-run work directories.
    pub work_root: Option<PathBuf>,
    /// Start children from an allowlisted environment instead of the parent's.
    pub scrub_env: bool,
    /// Variables set on every child, applied last.
    pub env: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::default(),
            timeout: Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            work_root: None,
            scrub_env: true,
            env: BTreeMap::new(),
        }
    }
}

impl SandboxConfig {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max.max(1);
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn with_scrub_env(mut self, scrub: bool) -> Self {
        self.scrub_env = scrub;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl From<&SandboxSection> for SandboxConfig {
    fn from(section: &SandboxSection) -> Self {
        Self {
            interpreter: Interpreter {
                program: section.program.clone(),
                args: section.args.clone(),
                file_name: section.file_name.clone(),
            },
            timeout: section.timeout(),
            max_output_bytes: section.max_output_bytes,
            // An empty path means "use the system temp dir".
            work_root: section
                .work_dir
                .clone()
                .filter(|dir| !dir.as_os_str().is_empty()),
            scrub_env: section.scrub_env,
            env: section.env.clone(),
        }
    }
}
