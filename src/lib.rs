//! # Scriptorium
//!
//! A process-local logging pipeline: named loggers feed events through
//! optional batching and asynchronous dispatch into console output and
//! size- or time-rotated files whose rotated generations are gzip-compressed
//! in the background.
//!
//! ## Features
//!
//! - **Ambient context**: key/value scopes attached to every event emitted
//!   inside them, captured at emit time
//! - **Structured output**: one JSON object per line, or plain text
//! - **Batching**: size- or time-triggered, order preserving
//! - **Async dispatch**: one process-wide consumer thread, never blocks callers
//! - **Rotation**: compression on a bounded worker pool, off the write path
//!
//! ```
//! use scriptorium::{get_logger, info, log_context, fields, LoggerConfig};
//!
//! let logger = get_logger("crate_doc", LoggerConfig::new().console(false)).unwrap();
//! log_context(fields([("request_id", "abc-123")]), || {
//!     info!(logger, "handled in {} ms", 12);
//! });
//! logger.close().unwrap();
//! ```

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        close_logger, fields, get_logger, log_context, shutdown, ContextStore, ErrorInfo,
        FieldValue, Formatter, LogEvent, LogLevel, Logger, LoggerConfig, LoggerError,
        LoggerMetrics, Result, Sink, DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::sinks::{ConsoleSink, FileSink, MemorySink, RotatingFileSink};
}

pub use crate::core::{
    close_logger, fields, find_logger, get_logger, log_context, shutdown, ContextMap,
    ContextScope, ContextStore, ErrorInfo, EventBuilder, FieldValue, Formatter, JsonFormatter,
    LogEvent, LogLevel, Logger, LoggerConfig, LoggerError, LoggerMetrics, Result, Sink,
    StructuredRecord, TextFormatter, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use sinks::{
    AsyncSink, BatchSink, ConsoleSink, FanoutSink, FileSink, MemorySink, RotatingFileSink,
    RotationPolicy, RotationStrategy,
};
