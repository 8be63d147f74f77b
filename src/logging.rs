//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays clean. `RUST_LOG` overrides
//! the configured level. When a log directory is configured, a JSON copy of every
//! event is also written to a daily-rolling file.

use crate::config::{LogFormat, LoggingSection};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "agent-crew.log";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(settings: &LoggingSection, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        settings.level.trim()
    };
    format!("agent_crew={}", level.to_lowercase())
}

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop and must be held until exit.
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init_logging(settings: &LoggingSection, verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directive(settings, verbose))
            .unwrap_or_else(|_| EnvFilter::new("agent_crew=info"))
    });

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    match settings.format {
        LogFormat::Text => layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        ),
        LogFormat::Json => layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed()),
    }

    let guard = settings.directory.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard
    });

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .ok();

    guard
}
