//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "HIVE_LOG";

/// Install the global subscriber.
///
/// `HIVE_LOG` takes precedence over `config.level`. Returns `false` when a
/// global subscriber was already installed, which leaves the existing one in
/// place.
pub fn init(config: &LoggingSection) -> bool {
    let filter = build_filter(&config.level);
    let subscriber = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };

    result.is_ok()
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_keeps_first_subscriber() {
        let config = LoggingSection::default();
        // Another test binary thread may have installed one already.
        let _ = init(&config);
        assert!(!init(&config));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        // Must not panic on a malformed directive.
        let _ = build_filter("not a [valid directive");
    }
}
