//! Centralized timeout and limit constants for the Hive crates.

/// Default wall-clock limit for a single sandbox run in seconds.
///
/// A sandboxed program still running after this long has its process group
/// killed and is reported as timed out.
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of swarm task bodies running at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1000;

/// Default number of execution attempts made by the repair loop.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-stream capture limit for sandbox output (1MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Grace period given to a killed sandbox process to be reaped.
pub const KILL_GRACE_MILLIS: u64 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_defaults_are_reasonable() {
        assert!(DEFAULT_SANDBOX_TIMEOUT_SECS > 0);
        assert!(DEFAULT_MAX_CONCURRENCY > 0);
        assert!(DEFAULT_MAX_RETRIES > 0);
        assert!(DEFAULT_MAX_OUTPUT_BYTES >= 64 * 1024);

        // Reaping a killed child must not eat a meaningful share of the run budget
        assert!(KILL_GRACE_MILLIS < DEFAULT_SANDBOX_TIMEOUT_SECS * 1000 / 10);
    }
}
