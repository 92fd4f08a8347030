//! Log event record
//!
//! A [`LogEvent`] is built on the emitting thread and is immutable from then
//! on. The message is stored as a template plus positional arguments and is
//! only resolved when a formatter renders the event.

use super::context::ContextStore;
use super::fields::{ContextMap, FieldValue};
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

// Thread-local caches for thread information to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

fn current_thread_id() -> String {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()))
            .clone()
    })
}

fn current_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

/// Captured error attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Short type name of the error, e.g. `ParseIntError`
    pub kind: String,
    pub message: String,
    /// Messages of the `source()` chain, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error and its source chain
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let full_name = std::any::type_name::<E>();
        let kind = short_type_name(full_name);

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind,
            message: error.to_string(),
            causes,
        }
    }

    /// Multi-line rendering: `Kind: message` followed by one line per cause
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        for cause in &self.causes {
            out.push_str("\nCaused by: ");
            out.push_str(cause);
        }
        out
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn short_type_name(full: &str) -> String {
    // `dyn std::error::Error` and generic paths keep only their last segment.
    let head = full.split('<').next().unwrap_or(full);
    let head = head.trim_start_matches("dyn ");
    head.rsplit("::").next().unwrap_or(head).to_string()
}

/// Reason a message template could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("placeholder {index} has no matching argument ({available} given)")]
    MissingArgument { index: usize, available: usize },

    #[error("{unused} argument(s) not consumed by the template")]
    UnusedArguments { unused: usize },

    #[error("unbalanced brace at byte {position}")]
    UnbalancedBrace { position: usize },

    #[error("invalid placeholder '{{{placeholder}}}'")]
    InvalidPlaceholder { placeholder: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub logger: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Raw message template, `{}` and `{N}` placeholders
    pub template: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Attributes attached by the call site
    #[serde(default)]
    pub extra: ContextMap,
    /// Ambient context captured when the event was created
    #[serde(default)]
    pub context: ContextMap,
    pub thread_id: String,
    pub thread_name: Option<String>,
}

impl LogEvent {
    /// Create an event, capturing the calling thread's ambient context
    pub fn new(logger: impl Into<String>, level: LogLevel, template: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            level,
            timestamp: Utc::now(),
            template: template.into(),
            args: Vec::new(),
            error: None,
            extra: ContextMap::new(),
            context: ContextStore::snapshot(),
            thread_id: current_thread_id(),
            thread_name: current_thread_name(),
        }
    }

    pub fn with_args(mut self, args: Vec<FieldValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<FieldValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Replace the captured ambient context
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    /// Resolve the template against the positional arguments.
    ///
    /// A template without arguments is taken literally, braces included.
    pub fn resolve(&self) -> Result<String, MessageError> {
        if self.args.is_empty() {
            return Ok(self.template.clone());
        }
        resolve_template(&self.template, &self.args)
    }

    /// Resolved and sanitized message.
    ///
    /// Never fails: an unresolvable template yields an error marker that
    /// still carries the raw template.
    pub fn message(&self) -> String {
        match self.resolve() {
            Ok(message) => sanitize_message(&message),
            Err(e) => sanitize_message(&format!(
                "<unresolvable message: {:?} ({})>",
                self.template, e
            )),
        }
    }
}

/// Escape line breaks and tabs so one event always renders as one line
pub fn sanitize_message(message: &str) -> String {
    message
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn resolve_template(template: &str, args: &[FieldValue]) -> Result<String, MessageError> {
    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut used = vec![false; args.len()];
    let mut next = 0usize;
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut spec = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    spec.push(inner);
                }
                if !closed {
                    return Err(MessageError::UnbalancedBrace { position: pos });
                }

                let index = if spec.is_empty() {
                    let index = next;
                    next += 1;
                    index
                } else {
                    spec.trim()
                        .parse::<usize>()
                        .map_err(|_| MessageError::InvalidPlaceholder {
                            placeholder: spec.clone(),
                        })?
                };

                let value = args.get(index).ok_or(MessageError::MissingArgument {
                    index,
                    available: args.len(),
                })?;
                used[index] = true;
                out.push_str(&value.to_string());
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(MessageError::UnbalancedBrace { position: pos });
                }
            }
            other => out.push(other),
        }
    }

    let unused = used.iter().filter(|u| !**u).count();
    if unused > 0 {
        return Err(MessageError::UnusedArguments { unused });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::log_context;
    use crate::core::fields::fields;

    fn event(template: &str) -> LogEvent {
        LogEvent::new("test", LogLevel::Info, template)
    }

    #[test]
    fn test_sequential_placeholders() {
        let e = event("user {} did {}").with_arg(42).with_arg("login");
        assert_eq!(e.resolve().unwrap(), "user 42 did login");
    }

    #[test]
    fn test_positional_and_escaped_braces() {
        let e = event("{1} before {0} {{literal}}").with_arg("a").with_arg("b");
        assert_eq!(e.resolve().unwrap(), "b before a {literal}");
    }

    #[test]
    fn test_template_without_args_is_literal() {
        let e = event("json looks like {\"a\": 1}");
        assert_eq!(e.message(), "json looks like {\"a\": 1}");
    }

    #[test]
    fn test_missing_argument_yields_marker() {
        let e = event("{} and {}").with_arg(1);
        assert_eq!(
            e.resolve(),
            Err(MessageError::MissingArgument {
                index: 1,
                available: 1
            })
        );
        let message = e.message();
        assert!(message.starts_with("<unresolvable message:"));
        assert!(message.contains("{} and {}"));
    }

    #[test]
    fn test_unused_and_unbalanced() {
        let e = event("no placeholders").with_arg(1);
        assert!(matches!(
            e.resolve(),
            Err(MessageError::UnusedArguments { unused: 1 })
        ));

        let e = event("open { brace").with_arg(1);
        assert!(matches!(e.resolve(), Err(MessageError::UnbalancedBrace { .. })));

        let e = event("{name}").with_arg(1);
        assert!(matches!(
            e.resolve(),
            Err(MessageError::InvalidPlaceholder { .. })
        ));
    }

    #[test]
    fn test_message_is_sanitized() {
        let e = event("line one\nline two\tend");
        assert_eq!(e.message(), "line one\\nline two\\tend");
    }

    #[test]
    fn test_event_captures_ambient_context() {
        let e = log_context(fields([("request_id", "abc")]), || event("inside"));
        assert_eq!(e.context["request_id"], FieldValue::from("abc"));
        assert!(event("outside").context.is_empty());
    }

    #[test]
    fn test_error_info_chain() {
        #[derive(Debug)]
        struct Outer(std::num::ParseIntError);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "could not read port")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let inner = "x".parse::<u16>().unwrap_err();
        let info = ErrorInfo::from_error(&Outer(inner));
        assert_eq!(info.kind, "Outer");
        assert_eq!(info.causes.len(), 1);
        assert!(info.render().starts_with("Outer: could not read port\nCaused by: "));
    }
}
