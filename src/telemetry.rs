//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Noisy dependencies are capped unless `RUST_LOG` says otherwise.
const DEPENDENCY_DIRECTIVES: &str = "ort=warn,hf_hub=warn,symphonia=warn";

/// Filter directives derived from the configuration.
pub fn filter_directives(config: &Config) -> String {
    let level = if config.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    format!("{},{}", level, DEPENDENCY_DIRECTIVES)
}

/// Install the global subscriber.
///
/// JSON lines by default, human readable output in debug mode. `RUST_LOG`
/// overrides the configured level. Calling this twice is harmless.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.debug {
        registry
            .with(fmt::layer().with_target(true).pretty())
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_level(true)
                    .json(),
            )
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_forces_debug_level() {
        let config = Config {
            debug: true,
            log_level: "warn".into(),
            ..Config::default()
        };
        assert!(filter_directives(&config).starts_with("debug,"));
    }

    #[test]
    fn configured_level_is_used() {
        let config = Config {
            log_level: "warn".into(),
            ..Config::default()
        };
        let directives = filter_directives(&config);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("ort=warn"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }

    #[test]
    fn second_init_does_not_panic() {
        let config = Config::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
