//! Tracing bootstrap for the hyperbeat binary.

use anyhow::{Context, Result};
use hyperbeat_core::LogConfig;
use std::fs::File;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the file-appender worker alive for the life of the process.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber described by `config`.
///
/// Logs go to stderr so stdout stays clean for run summaries. When file
/// output is enabled the returned guard must be held until shutdown,
/// otherwise trailing records are lost with the worker thread.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    // RUST_LOG overrides the configured level
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.parse_level().into())
            .from_env_lossy()
    };

    let console = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_filter(filter())
    });

    let (file, guard) = if config.file_output {
        config
            .ensure_log_directory()
            .context("failed to create log directory")?;
        if let Err(e) = config.cleanup_old_logs() {
            eprintln!("warning: log cleanup failed: {e}");
        }

        let path = config.current_log_path();
        let sink = File::create(&path)
            .with_context(|| format!("failed to create log file {path:?}"))?;
        let (writer, worker) = tracing_appender::non_blocking(sink);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(filter());
        (Some(layer), Some(LogGuard { _worker: worker }))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    tracing::info!("Logging at level {}", config.level);
    if config.file_output {
        tracing::info!("Log file: {:?}", config.current_log_path());
    }

    Ok(guard)
}
