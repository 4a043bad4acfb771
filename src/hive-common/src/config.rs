//! Hive configuration.
//!
//! Configuration is read from a TOML document with one table per subsystem:
//!
//! ```toml
//! [swarm]
//! max_concurrency = 16
//! on_dependency_failure = "skip"
//!
//! [sandbox]
//! program = "python3"
//! timeout_secs = 10
//!
//! [repair]
//! max_retries = 5
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```
//!
//! Every field is optional; missing fields take the documented default.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timeout::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_RETRIES,
    DEFAULT_SANDBOX_TIMEOUT_SECS,
};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What the scheduler does with a task whose dependency did not succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFailurePolicy {
    /// Run the dependent anyway; it can inspect the failed outcome.
    #[default]
    Run,
    /// Do not run the dependent; record it as skipped.
    Skip,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub swarm: SwarmSection,

    #[serde(default)]
    pub sandbox: SandboxSection,

    #[serde(default)]
    pub repair: RepairSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[swarm]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSection {
    /// Maximum number of task bodies running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-task body timeout in seconds (0 disables it).
    #[serde(default)]
    pub task_timeout_secs: u64,

    #[serde(default)]
    pub on_dependency_failure: DependencyFailurePolicy,
}

/// `[sandbox]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSection {
    /// Interpreter executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,

    /// Name of the script file written into the work directory.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Per-stream capture limit in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Parent directory for per-run work directories (system temp dir if unset).
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Start the child from a cleared environment.
    #[serde(default = "default_true")]
    pub scrub_env: bool,

    /// Extra variables set on every child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[repair]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Stop early when the agent hands back the code that just failed.
    #[serde(default)]
    pub stop_on_unchanged: bool,

    /// Fence language tag preferred when a response holds several code blocks.
    #[serde(default = "default_language")]
    pub language: String,
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive used when `HIVE_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_file_name() -> String {
    "main.py".to_string()
}

fn default_sandbox_timeout() -> u64 {
    DEFAULT_SANDBOX_TIMEOUT_SECS
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_language() -> String {
    "python".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: 0,
            on_dependency_failure: DependencyFailurePolicy::default(),
        }
    }
}

impl SwarmSection {
    /// Per-task timeout, if one is configured.
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            file_name: default_file_name(),
            timeout_secs: default_sandbox_timeout(),
            max_output_bytes: default_max_output_bytes(),
            work_dir: None,
            scrub_env: true,
            env: BTreeMap::new(),
        }
    }
}

impl SandboxSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RepairSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stop_on_unchanged: false,
            language: default_language(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl HiveConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. The result is validated.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.swarm.max_concurrency == 0 {
            return Err(invalid("swarm.max_concurrency", "must be at least 1"));
        }
        if self.sandbox.program.trim().is_empty() {
            return Err(invalid("sandbox.program", "must not be empty"));
        }
        if self.sandbox.file_name.trim().is_empty() {
            return Err(invalid("sandbox.file_name", "must not be empty"));
        }
        if !is_bare_file_name(&self.sandbox.file_name) {
            return Err(invalid(
                "sandbox.file_name",
                "must be a bare file name without directories",
            ));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(invalid("sandbox.timeout_secs", "must be at least 1"));
        }
        if self.sandbox.max_output_bytes == 0 {
            return Err(invalid("sandbox.max_output_bytes", "must be at least 1"));
        }
        if self.repair.max_retries == 0 {
            return Err(invalid("repair.max_retries", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// A single normal path component: no directories, no `.` or `..`.
fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
