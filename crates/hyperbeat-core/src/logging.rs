//! Logging configuration.
//!
//! The subscriber itself is installed by the binary; this module only holds
//! the serializable configuration and the log-directory housekeeping it
//! implies.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::Level;

/// Logging configuration persisted alongside the rest of the app config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: "trace", "debug", "info", "warn", or "error"
    pub level: String,
    /// Mirror logs to stderr
    pub console_output: bool,
    /// Write logs to a dated file under the log directory
    pub file_output: bool,
    /// Log directory; defaults to `<data dir>/hyperbeat/logs`
    pub log_dir: Option<PathBuf>,
    /// Dated log files kept by [`LogConfig::cleanup_old_logs`]
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: true,
            log_dir: None,
            max_files: 7,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, falling back to INFO on junk.
    pub fn parse_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// The effective log directory.
    pub fn log_directory(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hyperbeat")
                .join("logs")
        })
    }

    /// Path of today's log file.
    pub fn current_log_path(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y-%m-%d");
        self.log_directory().join(format!("hyperbeat-{}.log", date))
    }

    /// Create the log directory if needed.
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.log_directory())
    }

    /// Delete the oldest dated log files beyond `max_files`.
    pub fn cleanup_old_logs(&self) -> std::io::Result<()> {
        let dir = self.log_directory();
        if !dir.exists() {
            return Ok(());
        }

        let mut logs: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().map(|e| e == "log").unwrap_or(false)
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("hyperbeat-"))
                        .unwrap_or(false)
            })
            .collect();

        if logs.len() <= self.max_files {
            return Ok(());
        }

        // Dated filenames sort chronologically
        logs.sort();
        for old in &logs[..logs.len() - self.max_files] {
            if let Err(e) = fs::remove_file(old) {
                tracing::warn!("Failed to remove old log {:?}: {}", old, e);
            }
        }
        Ok(())
    }
}
