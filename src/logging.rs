//! Tracing setup for hosts embedding the compiler.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the caller. `init_tracing` is the stock setup driven by [`LoggingConfig`].

use crate::config::LoggingConfig;
use std::env;

/// Environment variable overriding `logging.level` (any `EnvFilter` directive)
pub const LOG_ENV: &str = "SQL2DDLOG_LOG";

/// Environment variable overriding `logging.format` (`1` = json)
pub const LOG_JSON_ENV: &str = "SQL2DDLOG_LOG_JSON";

/// Filter directive in effect: the environment first, then the config
pub fn effective_level(logging_config: &LoggingConfig) -> String {
    env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| logging_config.level.clone())
}

fn use_json(logging_config: &LoggingConfig) -> bool {
    env::var(LOG_JSON_ENV)
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0")
}

/// Install a global fmt subscriber. A subscriber that is already installed
/// wins; the call is then a no-op.
pub fn init_tracing(logging_config: &LoggingConfig) {
    let level = effective_level(logging_config);
    let filter = || {
        tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if use_json(logging_config) {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .json()
                .finish(),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact()
                .finish(),
        )
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&LoggingConfig {
            level: "not a directive [".to_string(),
            format: "json".to_string(),
        });
        tracing::info!("still logging");
    }

    #[test]
    fn test_effective_level_falls_back_to_config() {
        if env::var(LOG_ENV).is_err() {
            let config = LoggingConfig {
                level: "debug".to_string(),
                format: "text".to_string(),
            };
            assert_eq!(effective_level(&config), "debug");
        }
    }
}
