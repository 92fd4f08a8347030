//! Error types for the logging pipeline

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// File sink error with path
    #[error("File sink error for '{path}': {message}")]
    FileSinkError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Compression of a rotated file failed
    #[error("Compression failed for '{path}': {message}")]
    CompressionError { path: String, message: String },

    /// A stage was used after `close`
    #[error("Sink '{0}' is closed")]
    SinkClosed(String),

    /// Writer error (generic)
    #[error("Writer error: {0}")]
    WriterError(String),

    /// Channel send error
    #[error("Failed to hand log event to background worker")]
    ChannelSendError,

    /// Background thread did not stop within its shutdown bound
    #[error("Timed out waiting for {0}")]
    ShutdownTimeout(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a file sink error
    pub fn file_sink(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileSinkError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a compression error
    pub fn compression(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::CompressionError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn sink_closed(name: impl Into<String>) -> Self {
        LoggerError::SinkClosed(name.into())
    }

    pub fn shutdown_timeout(what: impl Into<String>) -> Self {
        LoggerError::ShutdownTimeout(what.into())
    }

    /// Create a writer error (generic)
    pub fn writer<S: Into<String>>(msg: S) -> Self {
        LoggerError::WriterError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("batch_size", "must be greater than zero");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));

        let err = LoggerError::file_sink("/var/log/app.log", "Permission denied");
        assert!(matches!(err, LoggerError::FileSinkError { .. }));

        let err = LoggerError::compression("/var/log/app.log.1", "disk full");
        assert!(matches!(err, LoggerError::CompressionError { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = LoggerError::sink_closed("batch");
        assert_eq!(err.to_string(), "Sink 'batch' is closed");

        let err = LoggerError::shutdown_timeout("dispatch consumer");
        assert_eq!(err.to_string(), "Timed out waiting for dispatch consumer");
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("compressing log file", "cannot read source", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("compressing log file"));
        assert!(err.to_string().contains("cannot read source"));
    }
}
