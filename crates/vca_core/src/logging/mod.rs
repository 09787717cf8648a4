//! Logging infrastructure for the video content analyzer.
//!
//! This module provides:
//! - Per-run loggers with file + host callback output
//! - Compact mode with progress filtering
//! - Tail buffer for error diagnosis
//! - Mirroring into the `tracing` ecosystem (the host installs the subscriber)
//!
//! # Example
//!
//! ```no_run
//! use vca_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("run_20250101_120000", ".logs", LogConfig::default(), None)
//!     .unwrap();
//!
//! logger.phase("download");
//! logger.command("yt-dlp --dump-json ...");
//! logger.progress("download", 50, "Downloading");
//! logger.success("Run completed");
//! ```

mod run_logger;
mod types;

pub use run_logger::{RunLogger, RunLoggerBuilder};
pub use types::{LineCallback, LogConfig, LogLevel, MessagePrefix};

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
