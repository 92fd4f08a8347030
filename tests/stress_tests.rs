//! Stress tests for concurrent logging
//!
//! These tests verify:
//! - No event is lost through the async and batch stages under load
//! - Events from one thread keep their relative order
//! - Rotation under concurrent writers leaves only valid artifacts
//! - A failing sink never disturbs its neighbours

use flate2::read::GzDecoder;
use scriptorium::{
    close_logger, get_logger, info, LogEvent, Logger, LoggerConfig, LoggerError, MemorySink,
    Result, Sink,
};
use std::collections::HashMap;
use std::io::Read;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const THREADS: usize = 8;
const PER_THREAD: usize = 500;

fn produce(logger: &Logger) {
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    info!(logger, "{} {}", t, i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Producer thread panicked");
    }
}

/// Every thread's events must appear exactly once and in emission order
fn assert_per_thread_fifo(messages: &[String]) {
    assert_eq!(messages.len(), THREADS * PER_THREAD, "Events were lost");

    let mut next: HashMap<usize, usize> = HashMap::new();
    for message in messages {
        let mut parts = message.split(' ');
        let thread: usize = parts.next().unwrap().parse().unwrap();
        let seq: usize = parts.next().unwrap().parse().unwrap();
        let expected = next.entry(thread).or_insert(0);
        assert_eq!(seq, *expected, "Thread {} out of order", thread);
        *expected += 1;
    }
}

#[test]
fn test_async_under_load() {
    let captured = MemorySink::new();
    let logger = get_logger(
        "stress_async",
        LoggerConfig::new()
            .console(false)
            .async_logging(true)
            .sink(Box::new(captured.clone())),
    )
    .unwrap();

    produce(&logger);
    close_logger("stress_async").unwrap();

    assert_per_thread_fifo(&captured.messages());
    assert_eq!(logger.metrics().delivery_failures(), 0);
}

#[test]
fn test_batch_under_load() {
    let captured = MemorySink::new();
    let logger = get_logger(
        "stress_batch",
        LoggerConfig::new()
            .console(false)
            .batch_logging(true)
            .batch_size(64)
            .batch_interval(Duration::from_millis(20))
            .sink(Box::new(captured.clone())),
    )
    .unwrap();

    produce(&logger);
    close_logger("stress_batch").unwrap();

    assert_per_thread_fifo(&captured.messages());
    assert!(logger.metrics().batches_flushed() > 0);
}

#[test]
fn test_batch_and_async_under_load() {
    let captured = MemorySink::new();
    let logger = get_logger(
        "stress_batch_async",
        LoggerConfig::new()
            .console(false)
            .batch_logging(true)
            .async_logging(true)
            .batch_size(32)
            .sink(Box::new(captured.clone())),
    )
    .unwrap();

    produce(&logger);
    close_logger("stress_batch_async").unwrap();

    assert_per_thread_fifo(&captured.messages());
}

#[test]
fn test_rotation_under_concurrent_writers() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("stress.log");

    let logger = get_logger(
        "stress_rotation",
        LoggerConfig::new()
            .console(false)
            .async_logging(true)
            .log_file(&log_file)
            .max_bytes(16 * 1024)
            .backup_count(3),
    )
    .unwrap();

    produce(&logger);
    close_logger("stress_rotation").unwrap();

    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["stress.log", "stress.log.1.gz", "stress.log.2.gz", "stress.log.3.gz"]
    );

    for name in &names[1..] {
        let file = std::fs::File::open(temp_dir.path().join(name)).unwrap();
        let mut content = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut content)
            .expect("Corrupt rotated artifact");
        assert!(!content.is_empty());
    }
    assert_eq!(logger.metrics().compressions_failed(), 0);
}

struct FlakySink {
    calls: usize,
}

impl Sink for FlakySink {
    fn emit(&mut self, _event: &LogEvent) -> Result<()> {
        self.calls += 1;
        match self.calls % 3 {
            0 => panic!("flaky sink panicked"),
            1 => Err(LoggerError::writer("flaky sink refused")),
            _ => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[test]
fn test_failing_sink_isolated_under_load() {
    let captured = MemorySink::new();
    let logger = get_logger(
        "stress_flaky",
        LoggerConfig::new()
            .console(false)
            .async_logging(true)
            .sink(Box::new(FlakySink { calls: 0 }))
            .sink(Box::new(captured.clone())),
    )
    .unwrap();

    produce(&logger);
    logger.flush().unwrap();

    assert_per_thread_fifo(&captured.messages());
    let expected_failures = (1..=THREADS * PER_THREAD).filter(|c| c % 3 != 2).count();
    assert_eq!(logger.metrics().delivery_failures() as usize, expected_failures);
    logger.close().unwrap();
}
