//! Named logger handles
//!
//! A [`Logger`] is a cheap, cloneable handle to the registry entry for one
//! name. Logging calls never return errors: events below the logger's level
//! are skipped, and failures further down the chain are reported to stderr
//! and counted in [`LoggerMetrics`].

use super::context::ContextStore;
use super::error::Result;
use super::event::{ErrorInfo, LogEvent};
use super::fields::FieldValue;
use super::log_level::LogLevel;
use super::metrics::LoggerMetrics;
use super::pipeline::{LoggerConfig, Pipeline};
use super::sink::{deliver, Sink};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Registry entry behind every handle of one name
pub(crate) struct LoggerCore {
    name: String,
    level: RwLock<LogLevel>,
    pipeline: Mutex<Option<Pipeline>>,
    metrics: Arc<LoggerMetrics>,
}

impl LoggerCore {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            level: RwLock::new(LogLevel::Debug),
            pipeline: Mutex::new(None),
            metrics: Arc::new(LoggerMetrics::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Close the current chain, then build and install one from `config`
    pub(crate) fn reconfigure(&self, config: LoggerConfig) -> Result<()> {
        let mut slot = self.pipeline.lock();

        if let Some(old) = slot.take() {
            if let Err(e) = old.shutdown() {
                eprintln!(
                    "[LOGGER WARNING] Closing previous chain of logger '{}' failed: {}",
                    self.name, e
                );
            }
        }

        *self.level.write() = config.level;
        *slot = Some(Pipeline::build(config, &self.metrics)?);
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<()> {
        let pipeline = self.pipeline.lock().take();
        match pipeline {
            Some(pipeline) => pipeline.shutdown(),
            None => Ok(()),
        }
    }
}

/// Handle to a named logger
///
/// # Example
///
/// ```
/// use scriptorium::{get_logger, close_logger, LoggerConfig};
///
/// let logger = get_logger("doc_example", LoggerConfig::new().console(false)).unwrap();
/// logger.info("service started");
/// logger.event(scriptorium::LogLevel::Warning)
///     .message("slow request {}")
///     .arg("/orders")
///     .extra("latency_ms", 1250)
///     .emit();
/// close_logger("doc_example").unwrap();
/// ```
#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
}

impl Logger {
    pub(crate) fn from_core(core: Arc<LoggerCore>) -> Self {
        Self { core }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn level(&self) -> LogLevel {
        *self.core.level.read()
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.core.level.write() = level;
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Whether the logger currently has no chain (closed or never built)
    pub fn is_closed(&self) -> bool {
        self.core.pipeline.lock().is_none()
    }

    /// Stage names of the current chain, outermost first
    pub fn stages(&self) -> Vec<String> {
        self.core
            .pipeline
            .lock()
            .as_ref()
            .map(|p| p.stages().to_vec())
            .unwrap_or_default()
    }

    /// Log a literal message
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.is_enabled(level) {
            return;
        }
        self.dispatch(LogEvent::new(self.name(), level, message));
    }

    /// Log a template with positional arguments, resolved when formatted
    pub fn log_args(&self, level: LogLevel, template: impl Into<String>, args: Vec<FieldValue>) {
        if !self.is_enabled(level) {
            return;
        }
        self.dispatch(LogEvent::new(self.name(), level, template).with_args(args));
    }

    /// Send a prepared event, subject to the level filter
    pub fn emit(&self, event: LogEvent) {
        if !self.is_enabled(event.level) {
            return;
        }
        self.dispatch(event);
    }

    fn dispatch(&self, event: LogEvent) {
        let mut slot = self.core.pipeline.lock();
        // A closed logger discards events
        let Some(ref mut pipeline) = *slot else {
            return;
        };

        self.core.metrics.record_emitted();
        deliver(pipeline, &event, &self.core.metrics, &self.core.name);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    /// Log at ERROR with `error` and its source chain attached
    pub fn exception<E>(&self, message: impl Into<String>, error: &E)
    where
        E: std::error::Error + ?Sized,
    {
        if !self.is_enabled(LogLevel::Error) {
            return;
        }
        let event = LogEvent::new(self.name(), LogLevel::Error, message)
            .with_error(ErrorInfo::from_error(error));
        self.dispatch(event);
    }

    /// Start building an event with arguments, extras or an error
    pub fn event(&self, level: LogLevel) -> EventBuilder<'_> {
        EventBuilder::new(self, level)
    }

    /// Push everything buffered or queued through to the terminal sinks
    pub fn flush(&self) -> Result<()> {
        match *self.core.pipeline.lock() {
            Some(ref mut pipeline) => pipeline.flush(),
            None => Ok(()),
        }
    }

    /// Close this logger's chain; same as [`close_logger`](super::pipeline::close_logger)
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.core.metrics
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.core.name)
            .field("level", &self.level())
            .finish()
    }
}

/// Fluent construction of one event
///
/// Nothing is sent until [`emit`](EventBuilder::emit) is called.
#[must_use = "the event is only logged when `emit` is called"]
pub struct EventBuilder<'a> {
    logger: &'a Logger,
    event: LogEvent,
}

impl<'a> EventBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel) -> Self {
        Self {
            logger,
            event: LogEvent::new(logger.name(), level, String::new()),
        }
    }

    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.event.template = template.into();
        self
    }

    pub fn arg(mut self, value: impl Into<FieldValue>) -> Self {
        self.event.args.push(value.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.event.extra.insert(key.into(), value.into());
        self
    }

    pub fn error<E>(mut self, error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        self.event.error = Some(ErrorInfo::from_error(error));
        self
    }

    /// Send the event; the ambient context is taken as of this call
    pub fn emit(self) {
        let event = self.event.with_context(ContextStore::snapshot());
        self.logger.emit(event);
    }
}
