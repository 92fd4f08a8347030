//! Async stage: hand events to the process-wide dispatcher
//!
//! The producer only clones the event onto the dispatch queue. Delivery to
//! the wrapped sink happens on the dispatcher's consumer thread, in the order
//! events were emitted.

use crate::core::dispatcher;
use crate::core::sink::{shared, SharedSink};
use crate::core::{LogEvent, LoggerError, LoggerMetrics, Result, Sink, DEFAULT_SHUTDOWN_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;

pub struct AsyncSink {
    target: SharedSink,
    metrics: Arc<LoggerMetrics>,
    drain_timeout: Duration,
    closed: bool,
}

impl AsyncSink {
    pub fn new(target: Box<dyn Sink>, metrics: Arc<LoggerMetrics>) -> Self {
        Self {
            target: shared(target),
            metrics,
            drain_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            closed: false,
        }
    }

    /// Bound on how long `flush` and `close` wait for queued events
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    fn drain(&self) -> Result<()> {
        if dispatcher::barrier(self.drain_timeout) {
            Ok(())
        } else {
            Err(LoggerError::shutdown_timeout("async dispatch queue"))
        }
    }
}

impl Sink for AsyncSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        if self.closed {
            return Err(LoggerError::sink_closed("async"));
        }
        dispatcher::submit(
            event.clone(),
            Arc::clone(&self.target),
            Arc::clone(&self.metrics),
        )
    }

    /// Wait until everything emitted so far reached the target, then flush it
    fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.target.lock().flush()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let drained = self.drain();
        if let Err(ref e) = drained {
            eprintln!(
                "[LOGGER WARNING] Closing async stage before its queue drained: {}",
                e
            );
        }
        self.target.lock().close()?;
        drained
    }

    fn name(&self) -> &str {
        "async"
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
