//! Tracing setup for the `framechain` binary and its sidecar workers.
//!
//! `RUST_LOG` overrides the configured filter. Sidecar workers log to stderr
//! only, since their stdout carries protocol frames.

use crate::config::{LoggingConfig, DEFAULT_LOG_FILTER};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber.
///
/// When `log_dir` is set, a daily-rolling file layer is added next to the
/// stderr layer. Keep the returned guard alive for the life of the process
/// so buffered file output is flushed on exit.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter(&config.filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        eprintln!("framechain: logging already initialized: {}", e);
    }
    guard
}

/// Install a stderr-only subscriber for a sidecar worker process.
pub fn init_worker() {
    let _ = tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LOG_FILTER))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init();
}
