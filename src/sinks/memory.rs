//! In-memory sink that captures events
//!
//! Clones share the same storage, so one clone can be installed in a
//! pipeline while another is kept to inspect what was delivered.

use crate::core::{Formatter, LogEvent, Result, Sink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
    lines: Arc<Mutex<Vec<String>>>,
    formatter: Option<Arc<dyn Formatter>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also keep each event rendered by `formatter`
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Resolved messages in delivery order
    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(LogEvent::message).collect()
    }

    /// Formatted lines, empty unless a formatter was set
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.lines.lock().clear();
    }

    /// Poll until at least `count` events arrived or `timeout` elapsed
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.len() >= count {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Sink for MemorySink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        if let Some(ref formatter) = self.formatter {
            self.lines.lock().push(formatter.format(event));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
