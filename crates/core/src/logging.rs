//! Structured logging infrastructure for Robofleet.
//!
//! Centralized subscriber setup. `RUST_LOG` wins over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the logging system from configuration.
///
/// # Example
/// ```no_run
/// use robofleet_core::{config::LoggingConfig, logging};
///
/// logging::init(&LoggingConfig::default());
/// tracing::info!(worker = "fleet-worker", "Worker started");
/// ```
pub fn init(config: &LoggingConfig) {
    let filter = env_filter(&config.level);

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Install a subscriber for tests; safe to call repeatedly
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(default_level))
}

/// Filter for a configured directive; unparseable directives mean `info`
fn level_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_bad_level_falls_back_to_info() {
        let filter = level_filter("robofleet=loud");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_configured_level_is_used() {
        let filter = level_filter("robofleet=debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_init_for_tests_is_repeatable() {
        init_for_tests();
        init_for_tests();
    }
}
