//! Sink trait for log output destinations
//!
//! Terminal sinks (console, file) format and write events. Decorators such as
//! the batch buffer and the async dispatch stage implement the same trait and
//! hold the sink they forward to.

use super::error::Result;
use super::event::LogEvent;
use super::metrics::LoggerMetrics;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

pub trait Sink: Send {
    fn emit(&mut self, event: &LogEvent) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Release resources. Stages owning background threads stop and join
    /// them here; the default just flushes.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str;
}

/// A sink shared between producers and background threads
pub type SharedSink = Arc<Mutex<Box<dyn Sink>>>;

pub fn shared(sink: Box<dyn Sink>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

pub(crate) fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Write one event with panic isolation, reporting instead of propagating.
///
/// Returns `true` when the sink accepted the event. Failures are printed to
/// stderr and counted in `metrics`.
pub(crate) fn deliver(
    sink: &mut dyn Sink,
    event: &LogEvent,
    metrics: &LoggerMetrics,
    stage: &str,
) -> bool {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.emit(event)));

    match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            eprintln!(
                "[LOGGER ERROR] {}: sink '{}' failed: {}",
                stage,
                sink.name(),
                e
            );
            metrics.record_delivery_failure();
            false
        }
        Err(panic_info) => {
            eprintln!(
                "[LOGGER CRITICAL] {}: sink '{}' panicked: {}. Remaining events continue.",
                stage,
                sink.name(),
                panic_message(panic_info.as_ref())
            );
            metrics.record_delivery_failure();
            false
        }
    }
}

/// Flush with panic isolation, reporting instead of propagating
pub(crate) fn flush_quietly(sink: &mut dyn Sink, stage: &str) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.flush()));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!(
                "[LOGGER ERROR] {}: sink '{}' flush failed: {}",
                stage,
                sink.name(),
                e
            );
        }
        Err(panic_info) => {
            eprintln!(
                "[LOGGER CRITICAL] {}: sink '{}' panicked during flush: {}",
                stage,
                sink.name(),
                panic_message(panic_info.as_ref())
            );
        }
    }
}
