//! Fan-out to several terminal sinks
//!
//! One failing or panicking sink never stops the others from receiving the
//! event, the same isolation the dispatch worker gives each sink.

use crate::core::sink::{deliver, flush_quietly};
use crate::core::{LogEvent, LoggerMetrics, Result, Sink};
use std::sync::Arc;

pub struct FanoutSink {
    sinks: Vec<Box<dyn Sink>>,
    metrics: Arc<LoggerMetrics>,
}

impl FanoutSink {
    pub fn new(metrics: Arc<LoggerMetrics>) -> Self {
        Self {
            sinks: Vec::new(),
            metrics,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Sink for FanoutSink {
    /// Failures of individual sinks are reported and counted, not returned
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        for sink in &mut self.sinks {
            deliver(sink.as_mut(), event, &self.metrics, "fanout");
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            flush_quietly(sink.as_mut(), "fanout");
        }
        Ok(())
    }

    /// Close every sink, returning the first error after all were tried
    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                eprintln!(
                    "[LOGGER ERROR] fanout: closing sink '{}' failed: {}",
                    sink.name(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
