//! Logging initialization.
//!
//! Console output through `tracing-subscriber` with an `EnvFilter`, plus
//! optional daily-rolling file output via `tracing-appender`. `RUST_LOG`
//! overrides the configured level.

use anyhow::Result;
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub use crate::infrastructure::config::LoggingConfig;

lazy_static! {
    // Keeps the non-blocking file writers alive for the process lifetime.
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "chrono-harvester.log";

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are no-ops (relevant for tests).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        if config.json_format {
            layers.push(fmt::layer().json().boxed());
        } else {
            layers.push(fmt::layer().with_target(true).boxed());
        }
    }

    if config.file_output {
        let appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
    }

    // try_init fails when a subscriber is already set; that is fine.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}
