//! Per-run logger with file, callback and tracing output.
//!
//! Each pipeline run gets its own logger that:
//! - Writes to a dedicated log file (when a log directory is configured)
//! - Sends lines to a host callback (if provided)
//! - Mirrors every message to `tracing` under the `vca::run` target
//! - Supports compact mode with progress filtering
//! - Maintains a tail buffer for error diagnosis

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LineCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-run logger.
pub struct RunLogger {
    run_name: String,
    log_path: Option<PathBuf>,
    file_writer: Mutex<Option<BufWriter<File>>>,
    line_callback: Mutex<Option<LineCallback>>,
    config: LogConfig,
    /// Recent lines, shown when a stage fails.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (for compact mode filtering).
    last_progress: Mutex<Option<u32>>,
}

impl RunLogger {
    /// Create a logger that writes `<log_dir>/<run_name>.log`.
    pub fn new(
        run_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        line_callback: Option<LineCallback>,
    ) -> std::io::Result<Self> {
        let run_name = run_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&run_name)));
        let file = File::create(&log_path)?;

        let mut logger = Self::detached(run_name, config, line_callback);
        logger.log_path = Some(log_path);
        *logger.file_writer.get_mut() = Some(BufWriter::new(file));
        Ok(logger)
    }

    /// Create a logger without a log file.
    pub fn detached(
        run_name: impl Into<String>,
        config: LogConfig,
        line_callback: Option<LineCallback>,
    ) -> Self {
        let tail_capacity = config.error_tail.max(1);
        Self {
            run_name: run_name.into(),
            log_path: None,
            file_writer: Mutex::new(None),
            line_callback: Mutex::new(line_callback),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(tail_capacity)),
            last_progress: Mutex::new(None),
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Path of the log file, if this logger writes one.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        self.mirror_to_tracing(level, message);
        self.push_tail(message);
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log an external command being executed.
    pub fn command(&self, command: &str) {
        let msg = MessagePrefix::Command.format(command);
        self.log(LogLevel::Debug, &msg);
    }

    /// Log a stage marker.
    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn skipped(&self, message: &str) {
        let msg = MessagePrefix::Skipped.format(message);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a progress update (filtered in compact mode).
    ///
    /// Returns true if the progress was logged, false if filtered.
    pub fn progress(&self, stage: &str, percent: u32, message: &str) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);

            // Only log at step intervals (e.g., 0%, 20%, 40%, ...)
            let current_step = (percent / step) * step;
            if let Some(previous) = *last {
                let last_step = (previous / step) * step;
                if current_step == last_step && percent < 100 {
                    return false;
                }
            }
            *last = Some(percent);
        }

        self.log(
            LogLevel::Info,
            &format!("[{}] {}% {}", stage, percent, message),
        );
        true
    }

    /// Reset progress filtering at a stage boundary.
    pub fn reset_progress(&self) {
        *self.last_progress.lock() = None;
    }

    /// Record output of an external tool.
    ///
    /// In compact mode these lines only go to the tail buffer.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        self.push_tail(line);

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        let msg = format!("{}{}", prefix, line);
        self.output(&self.format_message(&msg));
    }

    /// Show the tail buffer (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(&self.format_message(line));
        }
    }

    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the log file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn push_tail(&self, line: &str) {
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail.max(1) {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }

    fn mirror_to_tracing(&self, level: LogLevel, message: &str) {
        let run = self.run_name.as_str();
        match level {
            LogLevel::Trace => tracing::trace!(target: "vca::run", run, "{}", message),
            LogLevel::Debug => tracing::debug!(target: "vca::run", run, "{}", message),
            LogLevel::Info => tracing::info!(target: "vca::run", run, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "vca::run", run, "{}", message),
            LogLevel::Error => tracing::error!(target: "vca::run", run, "{}", message),
        }
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = *self.line_callback.lock() {
            callback(formatted);
        }
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("run_name", &self.run_name)
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '&' | '=' => '_',
            _ => c,
        })
        .collect()
}

/// Builder for creating a `RunLogger` with fluent API.
pub struct RunLoggerBuilder {
    run_name: String,
    log_dir: Option<PathBuf>,
    config: LogConfig,
    line_callback: Option<LineCallback>,
}

impl RunLoggerBuilder {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            log_dir: None,
            config: LogConfig::default(),
            line_callback: None,
        }
    }

    /// Write a log file into this directory.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn line_callback(mut self, callback: LineCallback) -> Self {
        self.line_callback = Some(callback);
        self
    }

    /// Build the logger. Falls back to a detached logger if the log file
    /// cannot be created.
    pub fn build(self) -> RunLogger {
        match self.log_dir {
            Some(dir) => {
                let name = self.run_name.clone();
                let config = self.config.clone();
                match RunLogger::new(self.run_name, &dir, self.config, None) {
                    Ok(logger) => {
                        *logger.line_callback.lock() = self.line_callback;
                        logger
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Cannot create run log in {}: {}; logging without file",
                            dir.display(),
                            e
                        );
                        RunLogger::detached(name, config, self.line_callback)
                    }
                }
            }
            None => RunLogger::detached(self.run_name, self.config, self.line_callback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run_1", dir.path(), LogConfig::default(), None).unwrap();

        let path = logger.log_path().unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("run_1.log"));
    }

    #[test]
    fn writes_to_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run_1", dir.path(), LogConfig::default(), None).unwrap();

        logger.info("Test message");
        logger.flush();

        let content = fs::read_to_string(logger.log_path().unwrap()).unwrap();
        assert!(content.contains("Test message"));
    }

    #[test]
    fn detached_logger_has_no_file() {
        let logger = RunLogger::detached("run_1", LogConfig::default(), None);
        logger.info("only in memory");
        assert!(logger.log_path().is_none());
        assert_eq!(logger.get_tail(), vec!["only in memory".to_string()]);
    }

    #[test]
    fn calls_line_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let callback: LineCallback = Box::new(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger = RunLogger::detached("run", LogConfig::default(), Some(callback));
        logger.info("Message 1");
        logger.info("Message 2");
        logger.debug("Filtered by level");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_mode_filters_progress() {
        let config = LogConfig {
            compact: true,
            progress_step: 20,
            ..Default::default()
        };
        let logger = RunLogger::detached("run", config, None);

        assert!(logger.progress("download", 0, "start"));
        assert!(!logger.progress("download", 5, ""));
        assert!(!logger.progress("download", 15, ""));
        assert!(logger.progress("download", 20, ""));
        assert!(!logger.progress("download", 25, ""));
        assert!(logger.progress("download", 100, "done"));

        logger.reset_progress();
        assert!(logger.progress("metadata", 40, ""));
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let config = LogConfig {
            compact: true,
            error_tail: 5,
            ..Default::default()
        };
        let logger = RunLogger::detached("run", config, None);

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i), false);
        }

        let tail = logger.get_tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");
    }

    #[test]
    fn builder_falls_back_when_dir_unusable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "file").unwrap();

        let logger = RunLoggerBuilder::new("run").log_dir(&blocker).build();
        assert!(logger.log_path().is_none());
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("watch?v=abc"), "watch_v_abc");
    }
}
