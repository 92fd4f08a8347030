//! Batch buffer: accumulate events, forward them in size- or time-triggered
//! batches
//!
//! Producers only push onto the pending buffer; they never perform I/O. A
//! timer thread owned by the sink forwards a batch when the buffer reaches
//! `capacity` (producers wake it) or when `interval` has passed since the
//! last flush.
//!
//! # Ordering
//!
//! A flush takes the forwarding lock before it swaps the pending events out,
//! so two flushes can never deliver their batches interleaved or out of
//! order. Events leave the buffer in the order they were appended.

use crate::core::sink::{deliver, flush_quietly};
use crate::core::shutdown::join_with_timeout;
use crate::core::{LogEvent, LoggerError, LoggerMetrics, Result, Sink, DEFAULT_SHUTDOWN_TIMEOUT};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default number of events per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default time between flushes (1 second)
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on how long the timer thread sleeps between checks
const MAX_POLL: Duration = Duration::from_millis(50);

enum Control {
    Flush,
    Stop,
}

struct Pending {
    events: Vec<LogEvent>,
    last_flush: Instant,
}

struct BatchState {
    pending: Mutex<Pending>,
    /// Held for the whole of a flush; doubles as the downstream's lock
    downstream: Mutex<Box<dyn Sink>>,
    metrics: Arc<LoggerMetrics>,
    capacity: usize,
    interval: Duration,
    closed: AtomicBool,
}

impl BatchState {
    /// Forward everything pending. Returns the number of events forwarded.
    fn flush_pending(&self) -> usize {
        let mut downstream = self.downstream.lock();

        let batch = {
            let mut pending = self.pending.lock();
            pending.last_flush = Instant::now();
            std::mem::take(&mut pending.events)
        };
        if batch.is_empty() {
            return 0;
        }

        for event in &batch {
            deliver(downstream.as_mut(), event, &self.metrics, "batch flush");
        }
        flush_quietly(downstream.as_mut(), "batch flush");
        self.metrics.record_batch_flushed();
        batch.len()
    }

    fn flush_due(&self) -> bool {
        let pending = self.pending.lock();
        !pending.events.is_empty() && pending.last_flush.elapsed() >= self.interval
    }
}

pub struct BatchSink {
    state: Arc<BatchState>,
    control: Sender<Control>,
    timer: Option<JoinHandle<()>>,
}

impl BatchSink {
    /// Buffer events for `downstream`, flushing every `capacity` events or
    /// every `interval`, whichever comes first
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero capacity or interval, or an
    /// I/O error if the timer thread cannot be spawned
    pub fn new(
        downstream: Box<dyn Sink>,
        capacity: usize,
        interval: Duration,
        metrics: Arc<LoggerMetrics>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(LoggerError::config("batch_size", "must be at least 1"));
        }
        if interval.is_zero() {
            return Err(LoggerError::config(
                "batch_interval",
                "must be greater than zero",
            ));
        }

        let state = Arc::new(BatchState {
            pending: Mutex::new(Pending {
                events: Vec::with_capacity(capacity),
                last_flush: Instant::now(),
            }),
            downstream: Mutex::new(downstream),
            metrics,
            capacity,
            interval,
            closed: AtomicBool::new(false),
        });

        // Wake-ups coalesce: one queued Flush is enough
        let (control, receiver) = bounded(1);
        let timer_state = Arc::clone(&state);
        let timer = thread::Builder::new()
            .name("scriptorium-batch".to_string())
            .spawn(move || Self::timer_loop(timer_state, receiver))
            .map_err(|e| {
                LoggerError::io_operation("starting batch timer", "Failed to spawn thread", e)
            })?;

        Ok(Self {
            state,
            control,
            timer: Some(timer),
        })
    }

    fn timer_loop(state: Arc<BatchState>, control: Receiver<Control>) {
        let poll = state.interval.min(MAX_POLL);

        loop {
            match control.recv_timeout(poll) {
                Ok(Control::Flush) => {
                    state.flush_pending();
                }
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if state.flush_due() {
                        state.flush_pending();
                    }
                }
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    pub fn interval(&self) -> Duration {
        self.state.interval
    }

    /// Events appended but not yet forwarded
    pub fn pending_len(&self) -> usize {
        self.state.pending.lock().events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

impl Sink for BatchSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        if self.is_closed() {
            return Err(LoggerError::sink_closed("batch"));
        }

        let full = {
            let mut pending = self.state.pending.lock();
            pending.events.push(event.clone());
            pending.events.len() >= self.state.capacity
        };

        if full {
            match self.control.try_send(Control::Flush) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    // Timer is gone; flush inline rather than grow unbounded
                    self.state.flush_pending();
                }
            }
        }
        Ok(())
    }

    /// Forward everything pending now, on the calling thread
    fn flush(&mut self) -> Result<()> {
        self.state.flush_pending();
        Ok(())
    }

    /// Stop the timer, forward what is left, then close downstream
    fn close(&mut self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut stopped_cleanly = true;
        if let Some(handle) = self.timer.take() {
            // The timer may be mid-flush; a blocking send waits for it
            let _ = self
                .control
                .send_timeout(Control::Stop, DEFAULT_SHUTDOWN_TIMEOUT);
            stopped_cleanly = join_with_timeout(handle, DEFAULT_SHUTDOWN_TIMEOUT, "batch timer");
        }

        self.state.flush_pending();
        let closed = self.state.downstream.lock().close();

        if !stopped_cleanly {
            return Err(LoggerError::shutdown_timeout("batch timer"));
        }
        closed
    }

    fn name(&self) -> &str {
        "batch"
    }
}

impl Drop for BatchSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
