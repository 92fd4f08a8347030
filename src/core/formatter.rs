//! Formatters: event to serialized line
//!
//! - [`JsonFormatter`]: one self-describing JSON object per event
//! - [`TextFormatter`]: `timestamp - LEVEL - message`
//!
//! Formatting is a pure function of the event. The ambient context was
//! captured into the event when it was created, so the same event always
//! renders to the same line.

use super::event::{sanitize_message, LogEvent};
use super::fields::{format_fields, ContextMap};
use super::log_level::LogLevel;
use super::timestamp::TimestampFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Keys written by [`JsonFormatter`] that extra attributes may not replace
pub const RESERVED_KEYS: [&str; 6] = [
    "timestamp",
    "level",
    "logger",
    "message",
    "context",
    "exception",
];

pub trait Formatter: Send + Sync {
    /// Render one event as a single line, without trailing newline
    fn format(&self, event: &LogEvent) -> String;
}

/// Pick the formatter matching the `structured` option
pub fn formatter_for(structured: bool) -> Arc<dyn Formatter> {
    if structured {
        Arc::new(JsonFormatter::new())
    } else {
        Arc::new(TextFormatter::new())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    timestamp_format: TimestampFormat,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    fn build_object(&self, event: &LogEvent) -> serde_json::Map<String, serde_json::Value> {
        let mut json_obj = serde_json::Map::new();

        json_obj.insert(
            "timestamp".to_string(),
            self.timestamp_format.to_json_value(&event.timestamp),
        );
        json_obj.insert(
            "level".to_string(),
            serde_json::Value::String(event.level.to_str().to_string()),
        );
        json_obj.insert(
            "logger".to_string(),
            serde_json::Value::String(event.logger.clone()),
        );
        json_obj.insert(
            "message".to_string(),
            serde_json::Value::String(event.message()),
        );

        let context = event
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json_value()))
            .collect();
        json_obj.insert("context".to_string(), serde_json::Value::Object(context));

        for (key, value) in &event.extra {
            let key = if RESERVED_KEYS.contains(&key.as_str()) {
                format!("extra.{}", key)
            } else {
                key.clone()
            };
            json_obj.insert(key, value.to_json_value());
        }

        if let Some(ref error) = event.error {
            json_obj.insert(
                "exception".to_string(),
                serde_json::Value::String(error.render()),
            );
        }

        json_obj
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let object = serde_json::Value::Object(self.build_object(event));
        // A map of strings, numbers and bools always serializes.
        serde_json::to_string(&object).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct TextFormatter {
    timestamp_format: TimestampFormat,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            timestamp_format: TimestampFormat::Classic,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }
}

impl Formatter for TextFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let mut line = format!(
            "{} - {} - {}",
            self.timestamp_format.format(&event.timestamp),
            event.level.to_str(),
            event.message()
        );

        if !event.context.is_empty() || !event.extra.is_empty() {
            let mut merged = event.context.clone();
            merged.extend(event.extra.clone());
            line.push_str(" | ");
            line.push_str(&sanitize_message(&format_fields(&merged)));
        }

        if let Some(ref error) = event.error {
            line.push_str(" | exception=");
            line.push_str(&sanitize_message(&error.render()));
        }

        line
    }
}

/// A structured line parsed back into its parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub timestamp: serde_json::Value,
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
    #[serde(default)]
    pub context: ContextMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Every other top-level key: the event's extra attributes
    #[serde(flatten)]
    pub extra: ContextMap,
}

impl StructuredRecord {
    /// Parse a line produced by [`JsonFormatter`]
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::log_context;
    use crate::core::event::ErrorInfo;
    use crate::core::fields::{fields, FieldValue};

    #[test]
    fn test_json_roundtrip() {
        let event = log_context(fields([("user_id", "123"), ("request_id", "abc")]), || {
            LogEvent::new("api", LogLevel::Warning, "retry {} of {}")
                .with_arg(2)
                .with_arg(5)
                .with_extra("attempt_ms", 250)
        });

        let line = JsonFormatter::new().format(&event);
        let record = StructuredRecord::from_json(&line).unwrap();

        assert_eq!(record.level, LogLevel::Warning);
        assert_eq!(record.logger, "api");
        assert_eq!(record.message, "retry 2 of 5");
        assert_eq!(record.context, event.context);
        assert_eq!(record.extra["attempt_ms"], FieldValue::Int(250));
        assert!(record.exception.is_none());
    }

    #[test]
    fn test_json_is_deterministic() {
        let event = LogEvent::new("svc", LogLevel::Info, "hello")
            .with_context(fields([("b", 2), ("a", 1)]));
        let formatter = JsonFormatter::new();
        assert_eq!(formatter.format(&event), formatter.format(&event));
    }

    #[test]
    fn test_json_exception_and_reserved_extra() {
        let event = LogEvent::new("svc", LogLevel::Error, "An error occurred")
            .with_error(ErrorInfo::new("ValueError", "Test error"))
            .with_extra("message", "shadow");

        let line = JsonFormatter::new().format(&event);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["message"], "An error occurred");
        assert_eq!(value["extra.message"], "shadow");
        assert!(value["exception"]
            .as_str()
            .unwrap()
            .contains("ValueError: Test error"));
    }

    #[test]
    fn test_json_unresolvable_message_still_emits() {
        let event = LogEvent::new("svc", LogLevel::Info, "{} {}").with_arg(1);
        let line = JsonFormatter::new().format(&event);
        let record = StructuredRecord::from_json(&line).unwrap();
        assert!(record.message.starts_with("<unresolvable message:"));
    }

    #[test]
    fn test_text_layout() {
        let event = LogEvent::new("svc", LogLevel::Info, "Processing {} items")
            .with_arg(100)
            .with_context(fields([("job", "sync")]));
        let line = TextFormatter::new().format(&event);

        assert!(line.contains(" - INFO - Processing 100 items"));
        assert!(line.ends_with(" | job=sync"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_text_exception_single_line() {
        let mut info = ErrorInfo::new("IoError", "disk full");
        info.causes.push("write failed".to_string());
        let event = LogEvent::new("svc", LogLevel::Error, "save failed").with_error(info);

        let line = TextFormatter::new().format(&event);
        assert!(line.contains("exception=IoError: disk full\\nCaused by: write failed"));
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_unrenderable_timestamp_pattern_still_formats() {
        let event = LogEvent::new("svc", LogLevel::Info, "still here");
        let pattern = TimestampFormat::Custom("%Q".to_string());

        let text = TextFormatter::new()
            .with_timestamp_format(pattern.clone())
            .format(&event);
        assert!(text.contains(" - INFO - still here"));

        let json = JsonFormatter::new().with_timestamp_format(pattern).format(&event);
        let record = StructuredRecord::from_json(&json).unwrap();
        assert_eq!(record.message, "still here");
    }
}
