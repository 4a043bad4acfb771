//! Shared building blocks for the Hive crates.
//!
//! - [`config`]: TOML configuration with one table per subsystem
//! - [`logging`]: tracing subscriber setup
//! - [`timeout`]: default timeouts and limits

pub mod config;
pub mod logging;
pub mod timeout;

pub use config::{
    ConfigError, ConfigResult, DependencyFailurePolicy, HiveConfig, LoggingSection,
    RepairSection, SandboxSection, SwarmSection,
};
pub use timeout::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_RETRIES,
    DEFAULT_SANDBOX_TIMEOUT_SECS,
};
