//! Logging macros with deferred formatting.
//!
//! Arguments are converted to [`FieldValue`](crate::FieldValue)s and stored
//! with the template; the message text is only built when a formatter renders
//! the event. Nothing is converted when the level is filtered out.
//!
//! # Examples
//!
//! ```
//! use scriptorium::{get_logger, info, LoggerConfig};
//!
//! let logger = get_logger("macros_doc", LoggerConfig::new().console(false)).unwrap();
//!
//! // Literal message
//! info!(logger, "Server started");
//!
//! // Placeholders: `{}` in order, or `{0}`, `{1}` by position
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//! info!(logger, "{1} performed {0}", "login", 42);
//! # logger.close().unwrap();
//! ```

/// Log a message at an explicit level.
///
/// # Examples
///
/// ```
/// # use scriptorium::{get_logger, LoggerConfig, LogLevel};
/// # let logger = get_logger("log_macro_doc", LoggerConfig::new().console(false)).unwrap();
/// use scriptorium::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $template:expr $(,)?) => {
        $logger.log($level, $template)
    };
    ($logger:expr, $level:expr, $template:expr, $($arg:expr),+ $(,)?) => {{
        let logger = &$logger;
        let level = $level;
        if logger.is_enabled(level) {
            logger.log_args(level, $template, vec![$($crate::FieldValue::from($arg)),+]);
        }
    }};
}

/// Log a debug-level message.
///
/// ```
/// # use scriptorium::{get_logger, LoggerConfig};
/// # let logger = get_logger("debug_macro_doc", LoggerConfig::new().console(false)).unwrap();
/// use scriptorium::debug;
/// debug!(logger, "Counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
///
/// ```
/// # use scriptorium::{get_logger, LoggerConfig};
/// # let logger = get_logger("warning_macro_doc", LoggerConfig::new().console(false)).unwrap();
/// use scriptorium::warning;
/// warning!(logger, "Retry attempt {} of {}", 3, 5);
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warning, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log a critical-level message.
///
/// ```
/// # use scriptorium::{get_logger, LoggerConfig};
/// # let logger = get_logger("critical_macro_doc", LoggerConfig::new().console(false)).unwrap();
/// use scriptorium::critical;
/// critical!(logger, "Unable to recover from error: {}", "disk full");
/// ```
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Critical, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::core::{get_logger, LogLevel, Logger, LoggerConfig};
    use crate::sinks::MemorySink;

    fn logger(name: &str) -> (Logger, MemorySink) {
        let captured = MemorySink::new();
        let logger = get_logger(
            name,
            LoggerConfig::new()
                .console(false)
                .sink(Box::new(captured.clone())),
        )
        .unwrap();
        (logger, captured)
    }

    #[test]
    fn test_level_macros() {
        let (logger, captured) = logger("macro_levels");

        debug!(logger, "Debug message");
        info!(logger, "Items: {}", 100);
        warning!(logger, "Retry {} of {}", 1, 3);
        error!(logger, "Code: {}", 500);
        critical!(logger, "Critical failure: {}", "system");
        log!(logger, LogLevel::Info, "{1} then {0}", "second", "first");

        assert_eq!(
            captured.messages(),
            vec![
                "Debug message",
                "Items: 100",
                "Retry 1 of 3",
                "Code: 500",
                "Critical failure: system",
                "first then second",
            ]
        );
        let levels: Vec<LogLevel> = captured.events().iter().map(|e| e.level).collect();
        let expected: Vec<LogLevel> = LogLevel::ALL
            .iter()
            .copied()
            .chain([LogLevel::Info])
            .collect();
        assert_eq!(levels, expected);
        logger.close().unwrap();
    }

    #[test]
    fn test_formatting_is_deferred() {
        let (logger, captured) = logger("macro_deferred");
        info!(logger, "user {} did {}", 7, "checkout");

        let event = &captured.events()[0];
        assert_eq!(event.template, "user {} did {}");
        assert_eq!(event.args.len(), 2);
        logger.close().unwrap();
    }

    #[test]
    fn test_filtered_level_skips_arguments() {
        let (logger, captured) = logger("macro_filtered");
        logger.set_level(LogLevel::Error);

        let mut evaluated = false;
        let mut touch = || {
            evaluated = true;
            1
        };
        info!(logger, "value {}", touch());

        assert!(!evaluated);
        assert!(captured.is_empty());
        logger.close().unwrap();
    }
}
