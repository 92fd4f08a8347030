//! Core pipeline types and traits

pub mod compressor;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod fields;
pub mod formatter;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod shutdown;
pub mod sink;
pub mod timestamp;

pub use compressor::{
    CompressionFailure, CompressionJob, CompressionPool, CompressionTicket, JobStatus,
};
pub use context::{log_context, ContextScope, ContextStore};
pub use error::{LoggerError, Result};
pub use event::{sanitize_message, ErrorInfo, LogEvent, MessageError};
pub use fields::{fields, ContextMap, FieldValue};
pub use formatter::{formatter_for, Formatter, JsonFormatter, StructuredRecord, TextFormatter};
pub use log_level::LogLevel;
pub use logger::{EventBuilder, Logger};
pub use metrics::LoggerMetrics;
pub use pipeline::{close_logger, find_logger, get_logger, shutdown, LoggerConfig, Pipeline};
pub use shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
pub use sink::{shared, SharedSink, Sink};
pub use timestamp::TimestampFormat;
