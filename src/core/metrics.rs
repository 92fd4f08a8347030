//! Pipeline metrics for observability
//!
//! Counters for monitoring pipeline health: delivery failures on background
//! threads, compression outcomes and flush activity. Background stages never
//! return their failures to the caller, so these counters are the place
//! where they surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// # Example
///
/// ```
/// use scriptorium::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_emitted();
/// metrics.record_delivery_failure();
///
/// assert_eq!(metrics.emitted(), 1);
/// assert_eq!(metrics.delivery_failures(), 1);
/// ```
#[derive(Debug)]
pub struct LoggerMetrics {
    /// Events accepted by a logger (passed the level filter)
    emitted: AtomicU64,

    /// Events a sink failed to write (error or panic)
    delivery_failures: AtomicU64,

    /// Batches forwarded by batch sinks
    batches_flushed: AtomicU64,

    /// Rotated files compressed successfully
    compressions_succeeded: AtomicU64,

    /// Rotated files left uncompressed after a failure
    compressions_failed: AtomicU64,
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            emitted: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            compressions_succeeded: AtomicU64::new(0),
            compressions_failed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn compressions_succeeded(&self) -> u64 {
        self.compressions_succeeded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn compressions_failed(&self) -> u64 {
        self.compressions_failed.load(Ordering::Relaxed)
    }

    /// Returns the previous value, like the other `record_*` methods
    #[inline]
    pub fn record_emitted(&self) -> u64 {
        self.emitted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivery_failure(&self) -> u64 {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_batch_flushed(&self) -> u64 {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_compression_succeeded(&self) -> u64 {
        self.compressions_succeeded.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_compression_failed(&self) -> u64 {
        self.compressions_failed.fetch_add(1, Ordering::Relaxed)
    }

    /// Delivery failure rate as a percentage (0.0 - 100.0)
    pub fn failure_rate(&self) -> f64 {
        let emitted = self.emitted() as f64;
        if emitted == 0.0 {
            0.0
        } else {
            (self.delivery_failures() as f64 / emitted) * 100.0
        }
    }

    pub fn reset(&self) {
        self.emitted.store(0, Ordering::Relaxed);
        self.delivery_failures.store(0, Ordering::Relaxed);
        self.batches_flushed.store(0, Ordering::Relaxed);
        self.compressions_succeeded.store(0, Ordering::Relaxed);
        self.compressions_failed.store(0, Ordering::Relaxed);
    }
}

impl Default for LoggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoggerMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            emitted: AtomicU64::new(self.emitted()),
            delivery_failures: AtomicU64::new(self.delivery_failures()),
            batches_flushed: AtomicU64::new(self.batches_flushed()),
            compressions_succeeded: AtomicU64::new(self.compressions_succeeded()),
            compressions_failed: AtomicU64::new(self.compressions_failed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.emitted(), 0);
        assert_eq!(metrics.delivery_failures(), 0);
        assert_eq!(metrics.compressions_failed(), 0);
    }

    #[test]
    fn test_record_returns_previous() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.record_delivery_failure(), 0);
        assert_eq!(metrics.record_delivery_failure(), 1);
        assert_eq!(metrics.delivery_failures(), 2);
    }

    #[test]
    fn test_failure_rate() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.failure_rate(), 0.0);

        for _ in 0..100 {
            metrics.record_emitted();
        }
        for _ in 0..10 {
            metrics.record_delivery_failure();
        }
        let rate = metrics.failure_rate();
        assert!((9.9..=10.1).contains(&rate), "Failure rate was {}", rate);
    }

    #[test]
    fn test_clone_is_snapshot() {
        let metrics = LoggerMetrics::new();
        metrics.record_compression_succeeded();

        let snapshot = metrics.clone();
        metrics.record_compression_succeeded();
        assert_eq!(snapshot.compressions_succeeded(), 1);
        assert_eq!(metrics.compressions_succeeded(), 2);

        metrics.reset();
        assert_eq!(metrics.compressions_succeeded(), 0);
    }
}
