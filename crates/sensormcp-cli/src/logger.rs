//! Plain log output to stderr.
//!
//! Stdout carries the protocol, so every log line goes to stderr. Lines look
//! like:
//!
//! ```text
//! 2026-01-05T10:11:12.345Z INFO  sensormcp::server: Server stopped (end of input)
//! ```

use std::io::Write;

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};
use sensormcp_server::LoggingConfig;

/// Logger that writes one line per record to stderr.
#[derive(Debug)]
pub struct StderrLogger {
    min_level: Level,
    show_timestamps: bool,
    show_targets: bool,
    show_file_line: bool,
}

impl StderrLogger {
    /// Create a logger using the builder pattern.
    #[must_use]
    pub fn builder() -> StderrLoggerBuilder {
        StderrLoggerBuilder::new()
    }

    fn format_record(&self, record: &Record) -> String {
        let mut line = String::new();
        if self.show_timestamps {
            line.push_str(&Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
            line.push(' ');
        }
        line.push_str(&format!("{:<5} ", record.level()));
        if self.show_targets {
            line.push_str(record.target());
            line.push_str(": ");
        }
        line.push_str(&record.args().to_string());
        if self.show_file_line {
            if let (Some(file), Some(no)) = (record.file(), record.line()) {
                line.push_str(&format!(" ({file}:{no})"));
            }
        }
        line
    }
}

/// Builder for configuring the stderr logger.
#[derive(Debug)]
pub struct StderrLoggerBuilder {
    min_level: Level,
    show_timestamps: bool,
    show_targets: bool,
    show_file_line: bool,
}

impl Default for StderrLoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StderrLoggerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_level: Level::Info,
            show_timestamps: true,
            show_targets: true,
            show_file_line: false,
        }
    }

    /// Start from a [`LoggingConfig`].
    #[must_use]
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new()
            .level(config.level)
            .with_timestamps(config.timestamps)
            .with_targets(config.targets)
            .with_file_line(config.file_line)
    }

    /// Set the minimum log level.
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Set the minimum log level from a LevelFilter.
    #[must_use]
    pub fn level_filter(mut self, filter: LevelFilter) -> Self {
        self.min_level = filter.to_level().unwrap_or(Level::Trace);
        self
    }

    /// Set whether to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }

    /// Set whether to show target/module paths.
    #[must_use]
    pub fn with_targets(mut self, show: bool) -> Self {
        self.show_targets = show;
        self
    }

    /// Set whether to show file:line information.
    #[must_use]
    pub fn with_file_line(mut self, show: bool) -> Self {
        self.show_file_line = show;
        self
    }

    /// Build the logger without installing it.
    #[must_use]
    pub fn build(self) -> StderrLogger {
        StderrLogger {
            min_level: self.min_level,
            show_timestamps: self.show_timestamps,
            show_targets: self.show_targets,
            show_file_line: self.show_file_line,
        }
    }

    /// Build and install as the global logger.
    ///
    /// Returns an error if a logger has already been set.
    pub fn init(self) -> Result<(), log::SetLoggerError> {
        let level = self.min_level;
        log::set_boxed_logger(Box::new(self.build()))?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }

    /// Build and install, ignoring errors if already set.
    pub fn try_init(self) {
        let _ = self.init();
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format_record(record);
        // A closed stderr must not take the server down.
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
