//! Pipeline assembly: configuration, per-logger chains and the registry
//!
//! A [`LoggerConfig`] describes which stages a named logger gets. The
//! assembled [`Pipeline`] is, from the logger's side:
//!
//! ```text
//! [BatchSink] -> [AsyncSink] -> FanoutSink -> console / rotating file / extra sinks
//! ```
//!
//! Batch and async stages are optional. [`get_logger`] on a name that already
//! has a chain closes that chain (joining its threads and awaiting its
//! compression jobs) before the new one is built, so two chains never write
//! the same file.

use super::compressor::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_WORKERS};
use super::dispatcher;
use super::error::{LoggerError, Result};
use super::event::LogEvent;
use super::formatter::formatter_for;
use super::log_level::LogLevel;
use super::logger::{Logger, LoggerCore};
use super::metrics::LoggerMetrics;
use super::sink::Sink;
use crate::sinks::{
    AsyncSink, BatchSink, ConsoleSink, FanoutSink, RotatingFileSink, RotationPolicy,
    RotationStrategy, DEFAULT_BACKUP_COUNT, DEFAULT_BATCH_SIZE, DEFAULT_MAX_BYTES,
};
use parking_lot::{const_mutex, Mutex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Options for one named logger
///
/// Every field has a default, so a JSON document only needs the options it
/// changes:
///
/// ```
/// use scriptorium::LoggerConfig;
///
/// let config = LoggerConfig::from_json(r#"{"batch_logging": true, "batch_size": 5}"#).unwrap();
/// assert!(config.batch_logging);
/// assert!(config.structured);
/// ```
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    /// JSON lines instead of plain text
    pub structured: bool,
    /// Colorize console output
    pub color: bool,
    pub async_logging: bool,
    pub batch_logging: bool,
    pub batch_size: usize,
    /// Seconds between time-triggered batch flushes
    pub batch_interval: f64,
    pub log_file: Option<PathBuf>,
    pub max_bytes: u64,
    /// Seconds between time-triggered rotations, in addition to `max_bytes`
    pub rotation_interval: Option<f64>,
    pub backup_count: usize,
    pub compression_level: u32,
    pub max_workers: usize,
    pub level: LogLevel,
    /// Write to stdout/stderr
    pub console: bool,
    #[serde(skip)]
    sinks: Vec<Box<dyn Sink>>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            structured: true,
            color: true,
            async_logging: false,
            batch_logging: false,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: 1.0,
            log_file: None,
            max_bytes: DEFAULT_MAX_BYTES,
            rotation_interval: None,
            backup_count: DEFAULT_BACKUP_COUNT,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_workers: DEFAULT_MAX_WORKERS,
            level: LogLevel::Debug,
            console: true,
            sinks: Vec::new(),
        }
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("structured", &self.structured)
            .field("color", &self.color)
            .field("async_logging", &self.async_logging)
            .field("batch_logging", &self.batch_logging)
            .field("batch_size", &self.batch_size)
            .field("batch_interval", &self.batch_interval)
            .field("log_file", &self.log_file)
            .field("max_bytes", &self.max_bytes)
            .field("rotation_interval", &self.rotation_interval)
            .field("backup_count", &self.backup_count)
            .field("compression_level", &self.compression_level)
            .field("max_workers", &self.max_workers)
            .field("level", &self.level)
            .field("console", &self.console)
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing options keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `JsonError` for malformed JSON, unknown options or values of
    /// the wrong type
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "loading configuration",
                format!("Failed to read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn structured(mut self, enabled: bool) -> Self {
        self.structured = enabled;
        self
    }

    #[must_use]
    pub fn color(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    #[must_use]
    pub fn async_logging(mut self, enabled: bool) -> Self {
        self.async_logging = enabled;
        self
    }

    #[must_use]
    pub fn batch_logging(mut self, enabled: bool) -> Self {
        self.batch_logging = enabled;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use]
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval.as_secs_f64();
        self
    }

    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval = Some(interval.as_secs_f64());
        self
    }

    #[must_use]
    pub fn backup_count(mut self, count: usize) -> Self {
        self.backup_count = count;
        self
    }

    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Add a terminal sink next to console and file output
    #[must_use]
    pub fn sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Check option values before any file is opened or thread started
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending option
    pub fn validate(&self) -> Result<()> {
        if self.batch_logging && self.batch_size == 0 {
            return Err(LoggerError::config("batch_size", "must be at least 1"));
        }
        if !(self.batch_interval.is_finite() && self.batch_interval > 0.0) {
            return Err(LoggerError::config(
                "batch_interval",
                format!("must be a positive number of seconds, got {}", self.batch_interval),
            ));
        }

        if let Some(ref path) = self.log_file {
            if path.as_os_str().is_empty() {
                return Err(LoggerError::config("log_file", "path is empty"));
            }
            if path.is_dir() {
                return Err(LoggerError::config(
                    "log_file",
                    format!("'{}' is a directory", path.display()),
                ));
            }
            if let Some(interval) = self.rotation_interval {
                if !(interval.is_finite() && interval > 0.0) {
                    return Err(LoggerError::config(
                        "rotation_interval",
                        format!("must be a positive number of seconds, got {}", interval),
                    ));
                }
            }
            self.rotation_policy().validate()?;
        }

        Ok(())
    }

    fn rotation_policy(&self) -> RotationPolicy {
        let strategy = match self.rotation_interval {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                RotationStrategy::hybrid(self.max_bytes, Duration::from_secs_f64(secs))
            }
            _ => RotationStrategy::size(self.max_bytes),
        };

        RotationPolicy::new()
            .with_strategy(strategy)
            .with_max_backups(self.backup_count)
            .with_compression(true)
            .with_compression_level(self.compression_level)
            .with_max_workers(self.max_workers)
    }
}

/// The assembled chain of one logger
pub struct Pipeline {
    head: Box<dyn Sink>,
    stages: Vec<String>,
}

impl Pipeline {
    /// Build the chain described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options, a log file that cannot be
    /// opened, or a background thread that cannot be started
    pub fn build(config: LoggerConfig, metrics: &Arc<LoggerMetrics>) -> Result<Self> {
        config.validate()?;

        let formatter = formatter_for(config.structured);
        let mut fanout = FanoutSink::new(Arc::clone(metrics));

        if config.console {
            fanout.push(Box::new(
                ConsoleSink::new(Arc::clone(&formatter)).with_colors(config.color),
            ));
        }
        if let Some(ref path) = config.log_file {
            fanout.push(Box::new(RotatingFileSink::with_metrics(
                path,
                config.rotation_policy(),
                Arc::clone(&formatter),
                Arc::clone(metrics),
            )?));
        }
        for sink in config.sinks {
            fanout.push(sink);
        }

        let mut stages: Vec<String> = fanout.sink_names();
        stages.insert(0, fanout.name().to_string());
        let mut head: Box<dyn Sink> = Box::new(fanout);

        if config.async_logging {
            head = Box::new(AsyncSink::new(head, Arc::clone(metrics)));
            stages.insert(0, "async".to_string());
        }
        if config.batch_logging {
            head = Box::new(BatchSink::new(
                head,
                config.batch_size,
                Duration::from_secs_f64(config.batch_interval),
                Arc::clone(metrics),
            )?);
            stages.insert(0, "batch".to_string());
        }

        Ok(Self { head, stages })
    }

    /// Stage names from the logger's side, then the terminal sinks
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Tear the chain down: stop its threads, drain what it holds, close files
    pub fn shutdown(mut self) -> Result<()> {
        self.head.close()
    }
}

impl Sink for Pipeline {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        self.head.emit(event)
    }

    fn flush(&mut self) -> Result<()> {
        self.head.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.head.close()
    }

    fn name(&self) -> &str {
        "pipeline"
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .finish()
    }
}

static REGISTRY: Mutex<BTreeMap<String, Arc<LoggerCore>>> = const_mutex(BTreeMap::new());

/// Configure the logger `name` and return a handle to it.
///
/// A logger that already exists keeps its identity: handles obtained earlier
/// see the new configuration. Its previous chain is closed before the new one
/// is built.
///
/// # Errors
///
/// Returns an error if `config` is invalid or the chain cannot be built. The
/// previous chain has already been closed at that point and the logger
/// discards events until it is configured successfully.
pub fn get_logger(name: &str, config: LoggerConfig) -> Result<Logger> {
    config.validate()?;

    // Closing the old chain can take a while; other names stay reachable
    let core = Arc::clone(
        REGISTRY
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LoggerCore::new(name))),
    );
    core.reconfigure(config)?;
    Ok(Logger::from_core(core))
}

/// Handle to an already configured logger
pub fn find_logger(name: &str) -> Option<Logger> {
    REGISTRY
        .lock()
        .get(name)
        .map(|core| Logger::from_core(Arc::clone(core)))
}

/// Close the chain of logger `name`, flushing everything it holds.
///
/// Unknown names are ignored. Handles to the logger stay valid and discard
/// events until the name is configured again.
///
/// # Errors
///
/// Returns the first error reported while closing a stage.
pub fn close_logger(name: &str) -> Result<()> {
    let core = REGISTRY.lock().get(name).cloned();
    match core {
        Some(core) => core.close(),
        None => Ok(()),
    }
}

/// Close every logger, then drain and stop the dispatcher.
///
/// Returns `false` if a stage failed to close or the dispatcher missed the
/// `timeout` bound.
pub fn shutdown(timeout: Duration) -> bool {
    let cores: Vec<Arc<LoggerCore>> = REGISTRY.lock().values().cloned().collect();

    let mut clean = true;
    for core in cores {
        if let Err(e) = core.close() {
            eprintln!(
                "[LOGGER ERROR] Closing logger '{}' during shutdown failed: {}",
                core.name(),
                e
            );
            clean = false;
        }
    }

    let drained = dispatcher::shutdown(timeout);
    clean && drained
}
