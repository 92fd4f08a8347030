//! Timestamp rendering for formatted lines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Timestamp format options
///
/// # Examples
///
/// ```
/// use scriptorium::core::TimestampFormat;
/// use chrono::Utc;
///
/// let rendered = TimestampFormat::Iso8601.format(&Utc::now());
/// assert!(rendered.ends_with('Z'));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// ISO 8601 with microseconds: `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// Space separated with comma milliseconds: `2025-01-08 10:30:45,123`
    Classic,

    /// Unix timestamp in milliseconds: `1736332245123`
    UnixMillis,

    /// Custom strftime format. A pattern chrono cannot render falls back
    /// to [`TimestampFormat::Iso8601`].
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Iso8601Micros => datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            TimestampFormat::Classic => {
                let millis = datetime.timestamp_subsec_millis();
                format!("{},{:03}", datetime.format("%Y-%m-%d %H:%M:%S"), millis)
            }
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(format_str) => {
                let mut rendered = String::new();
                match write!(rendered, "{}", datetime.format(format_str)) {
                    Ok(()) => rendered,
                    Err(_) => TimestampFormat::Iso8601.format(datetime),
                }
            }
        }
    }

    /// JSON representation: numbers for numeric formats, strings otherwise
    #[must_use]
    pub fn to_json_value(&self, datetime: &DateTime<Utc>) -> serde_json::Value {
        match self {
            TimestampFormat::UnixMillis => {
                serde_json::Value::Number(datetime.timestamp_millis().into())
            }
            _ => serde_json::Value::String(self.format(datetime)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_iso8601_format() {
        let result = TimestampFormat::Iso8601.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123Z");
    }

    #[test]
    fn test_iso8601_micros_format() {
        let result = TimestampFormat::Iso8601Micros.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123456Z");
    }

    #[test]
    fn test_classic_format() {
        let result = TimestampFormat::Classic.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08 10:30:45,123");
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::Custom("%Y/%m/%d %H:%M".to_string());
        assert_eq!(format.format(&fixed_datetime()), "2025/01/08 10:30");
    }

    #[test]
    fn test_invalid_custom_format_falls_back() {
        for pattern in ["%Q", "%", "%Y-%"] {
            let format = TimestampFormat::Custom(pattern.to_string());
            assert_eq!(format.format(&fixed_datetime()), "2025-01-08T10:30:45.123Z");
        }
    }

    #[test]
    fn test_json_value_numeric() {
        let value = TimestampFormat::UnixMillis.to_json_value(&fixed_datetime());
        assert!(value.is_number());
        let value = TimestampFormat::Iso8601.to_json_value(&fixed_datetime());
        assert!(value.is_string());
    }
}
