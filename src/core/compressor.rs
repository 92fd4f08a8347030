//! Background compression of rotated log files
//!
//! A rotated predecessor file is handed to a [`CompressionPool`] as one
//! [`CompressionJob`]. Jobs run on a bounded set of worker threads, never on
//! the thread that triggered the rotation.
//!
//! A job streams the source through gzip into a temporary artifact, renames
//! it into place and only then removes the source. Any failure removes the
//! temporary artifact and leaves the source untouched; the failure is
//! recorded on the pool instead of being returned to the logging call.

use super::error::{LoggerError, Result};
use super::metrics::LoggerMetrics;
use super::shutdown::join_with_timeout;
use super::sink::panic_message;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default gzip level for rotated files
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default number of compression worker threads
pub const DEFAULT_MAX_WORKERS: usize = 2;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// `path` with `suffix` appended to its file name (`app.log.1` + `.gz`)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// One compression of one closed file
#[derive(Debug, Clone)]
pub struct CompressionJob {
    source: PathBuf,
    level: u32,
}

impl CompressionJob {
    pub fn new(source: impl Into<PathBuf>, level: u32) -> Self {
        Self {
            source: source.into(),
            level: level.min(9),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Final artifact path: `<source>.gz`
    pub fn artifact_path(&self) -> PathBuf {
        with_suffix(&self.source, ".gz")
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.source, ".gz.tmp")
    }

    /// Compress the source file, returning the artifact path
    pub fn run(&self) -> Result<PathBuf> {
        self.run_with(|file| file)
    }

    /// Run with the artifact's file handle wrapped by `wrap`
    pub(crate) fn run_with<W, F>(&self, wrap: F) -> Result<PathBuf>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        let temp_path = self.temp_path();
        let artifact_path = self.artifact_path();

        if let Err(e) = self.compress_into(&temp_path, wrap) {
            Self::discard(&temp_path);
            return Err(e);
        }

        // Only a complete artifact ever appears under the final name
        fs::rename(&temp_path, &artifact_path).map_err(|e| {
            Self::discard(&temp_path);
            LoggerError::io_operation(
                "compressing rotated log",
                format!("Failed to rename artifact to {}", artifact_path.display()),
                e,
            )
        })?;

        if let Err(e) = fs::remove_file(&self.source) {
            // Compression succeeded; the leftover source is shifted and
            // eventually pruned by later rotations.
            eprintln!(
                "[LOGGER WARNING] Compressed {} but failed to remove the original: {}",
                self.source.display(),
                e
            );
        }

        Ok(artifact_path)
    }

    fn compress_into<W, F>(&self, temp_path: &Path, wrap: F) -> Result<()>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        let input = File::open(&self.source).map_err(|e| {
            LoggerError::io_operation(
                "compressing rotated log",
                format!("Failed to open {}", self.source.display()),
                e,
            )
        })?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, input);

        let output = File::create(temp_path).map_err(|e| {
            LoggerError::io_operation(
                "compressing rotated log",
                format!("Failed to create {}", temp_path.display()),
                e,
            )
        })?;
        let writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, wrap(output));
        let mut encoder = GzEncoder::new(writer, Compression::new(self.level));

        io::copy(&mut reader, &mut encoder).map_err(|e| {
            LoggerError::compression(self.source.display().to_string(), e.to_string())
        })?;

        let mut writer = encoder.finish().map_err(|e| {
            LoggerError::compression(
                self.source.display().to_string(),
                format!("Failed to finish gzip stream: {}", e),
            )
        })?;
        writer.flush().map_err(|e| {
            LoggerError::compression(
                self.source.display().to_string(),
                format!("Failed to flush artifact: {}", e),
            )
        })?;

        Ok(())
    }

    fn discard(temp_path: &Path) {
        if temp_path.exists() {
            if let Err(e) = fs::remove_file(temp_path) {
                eprintln!(
                    "[LOGGER WARNING] Failed to remove partial artifact {}: {}",
                    temp_path.display(),
                    e
                );
            }
        }
    }
}

/// A recorded compression failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionFailure {
    pub source: PathBuf,
    pub error: String,
}

/// Outcome of a submitted job as seen through its ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Compressed,
    Failed,
    Pending,
}

/// Completion handle for one submitted job
#[derive(Debug)]
pub struct CompressionTicket {
    source: PathBuf,
    done: Receiver<bool>,
    status: JobStatus,
}

impl CompressionTicket {
    fn finished(source: PathBuf, compressed: bool) -> Self {
        let (_tx, rx) = bounded(0);
        Self {
            source,
            done: rx,
            status: if compressed {
                JobStatus::Compressed
            } else {
                JobStatus::Failed
            },
        }
    }

    /// A ticket that stays pending until a result is sent on the returned sender
    #[cfg(test)]
    pub(crate) fn held(source: impl Into<PathBuf>) -> (Sender<bool>, Self) {
        let (done_tx, done_rx) = bounded(1);
        let ticket = Self {
            source: source.into(),
            done: done_rx,
            status: JobStatus::Pending,
        };
        (done_tx, ticket)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Wait up to `timeout` for the job to finish
    pub fn wait(&mut self, timeout: Duration) -> JobStatus {
        if self.status != JobStatus::Pending {
            return self.status;
        }
        self.status = match self.done.recv_timeout(timeout) {
            Ok(true) => JobStatus::Compressed,
            Ok(false) => JobStatus::Failed,
            Err(RecvTimeoutError::Timeout) => JobStatus::Pending,
            // Worker went away without reporting (pool abandoned)
            Err(RecvTimeoutError::Disconnected) => JobStatus::Failed,
        };
        self.status
    }

    pub fn status(&mut self) -> JobStatus {
        self.wait(Duration::ZERO)
    }
}

struct Task {
    job: CompressionJob,
    done: Sender<bool>,
}

/// Bounded worker pool running compression jobs
pub struct CompressionPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    failures: Arc<Mutex<Vec<CompressionFailure>>>,
    metrics: Arc<LoggerMetrics>,
    level: u32,
}

impl CompressionPool {
    /// Start `max_workers` worker threads compressing at `level` (0-9)
    ///
    /// # Errors
    ///
    /// Returns an error for zero workers, a level above 9, or if a worker
    /// thread cannot be spawned.
    pub fn new(max_workers: usize, level: u32, metrics: Arc<LoggerMetrics>) -> Result<Self> {
        if max_workers == 0 {
            return Err(LoggerError::config(
                "max_workers",
                "compression pool needs at least one worker",
            ));
        }
        if level > 9 {
            return Err(LoggerError::config(
                "compression_level",
                format!("gzip level must be between 0 and 9, got {}", level),
            ));
        }

        let (sender, receiver) = unbounded::<Task>();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let mut workers = Vec::with_capacity(max_workers);

        for idx in 0..max_workers {
            let receiver = receiver.clone();
            let failures = Arc::clone(&failures);
            let metrics = Arc::clone(&metrics);

            let handle = thread::Builder::new()
                .name(format!("scriptorium-compress-{}", idx))
                .spawn(move || Self::worker_loop(receiver, failures, metrics))
                .map_err(|e| {
                    LoggerError::io_operation(
                        "starting compression pool",
                        "Failed to spawn worker thread",
                        e,
                    )
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            failures,
            metrics,
            level,
        })
    }

    fn worker_loop(
        receiver: Receiver<Task>,
        failures: Arc<Mutex<Vec<CompressionFailure>>>,
        metrics: Arc<LoggerMetrics>,
    ) {
        while let Ok(task) = receiver.recv() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.job.run()));

            let error = match result {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic_info) => Some(format!(
                    "compression panicked: {}",
                    panic_message(panic_info.as_ref())
                )),
            };

            let compressed = match error {
                None => {
                    metrics.record_compression_succeeded();
                    true
                }
                Some(error) => {
                    eprintln!(
                        "[LOGGER WARNING] Compression of {} failed, original kept: {}",
                        task.job.source().display(),
                        error
                    );
                    metrics.record_compression_failed();
                    failures.lock().push(CompressionFailure {
                        source: task.job.source().to_path_buf(),
                        error,
                    });
                    false
                }
            };

            let _ = task.done.send(compressed);
        }
    }

    /// Schedule compression of `source`. Never blocks on I/O.
    pub fn submit(&self, source: impl Into<PathBuf>) -> CompressionTicket {
        let job = CompressionJob::new(source, self.level);
        let source = job.source().to_path_buf();
        let (done_tx, done_rx) = bounded(1);

        let sent = match self.sender {
            Some(ref sender) => sender.send(Task { job, done: done_tx }).is_ok(),
            None => false,
        };

        if sent {
            CompressionTicket {
                source,
                done: done_rx,
                status: JobStatus::Pending,
            }
        } else {
            eprintln!(
                "[LOGGER WARNING] Compression pool is shut down; {} left uncompressed",
                source.display()
            );
            self.metrics.record_compression_failed();
            self.failures.lock().push(CompressionFailure {
                source: source.clone(),
                error: LoggerError::sink_closed("compression pool").to_string(),
            });
            CompressionTicket::finished(source, false)
        }
    }

    /// Failures recorded so far
    pub fn failures(&self) -> Vec<CompressionFailure> {
        self.failures.lock().clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop accepting jobs and wait for queued and running jobs to finish.
    ///
    /// Returns `false` if a worker missed the `timeout` bound (it is then
    /// detached) or panicked.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        // Workers drain the queue, then see the disconnect and exit
        drop(self.sender.take());

        let deadline = Instant::now() + timeout;
        let mut clean = true;
        for handle in self.workers.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            clean &= join_with_timeout(handle, remaining, "compression worker");
        }
        clean
    }
}

impl Drop for CompressionPool {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown(super::shutdown::DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    /// Writer that fails once `remaining` bytes have been written
    struct FailAfter {
        inner: File,
        remaining: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    fn sample_content() -> String {
        (0..5000)
            .map(|i| format!("line {} checksum {:x}\n", i, i * 2654435761u64))
            .collect()
    }

    fn read_gz(path: &Path) -> String {
        let mut decoder = GzDecoder::new(File::open(path).unwrap());
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_job_compresses_and_removes_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log.1");
        fs::write(&source, "This is a test log entry\n").unwrap();

        let artifact = CompressionJob::new(&source, 6).run().unwrap();

        assert_eq!(artifact, dir.path().join("app.log.1.gz"));
        assert!(!source.exists());
        assert_eq!(read_gz(&artifact), "This is a test log entry\n");
    }

    #[test]
    fn test_failed_job_leaves_source_intact() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log.1");
        let content = sample_content();
        fs::write(&source, &content).unwrap();

        let job = CompressionJob::new(&source, 1);
        let result = job.run_with(|inner| FailAfter {
            inner,
            remaining: 64,
        });

        assert!(result.is_err());
        assert!(!job.artifact_path().exists());
        assert!(!job.temp_path().exists());
        assert_eq!(fs::read_to_string(&source).unwrap(), content);
    }

    #[test]
    fn test_missing_source_fails_without_artifact() {
        let dir = tempdir().unwrap();
        let job = CompressionJob::new(dir.path().join("gone.log.1"), 6);
        assert!(job.run().is_err());
        assert!(!job.artifact_path().exists());
        assert!(!job.temp_path().exists());
    }

    #[test]
    fn test_pool_runs_jobs_and_records_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.log.1");
        fs::write(&good, "payload").unwrap();
        let missing = dir.path().join("b.log.1");

        let metrics = Arc::new(LoggerMetrics::new());
        let mut pool = CompressionPool::new(2, 6, Arc::clone(&metrics)).unwrap();

        let mut ok = pool.submit(&good);
        let mut bad = pool.submit(&missing);
        assert_eq!(ok.wait(Duration::from_secs(5)), JobStatus::Compressed);
        assert_eq!(bad.wait(Duration::from_secs(5)), JobStatus::Failed);

        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(metrics.compressions_succeeded(), 1);
        assert_eq!(metrics.compressions_failed(), 1);

        let failures = pool.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].source, missing);
    }

    #[test]
    fn test_shutdown_awaits_queued_jobs() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(LoggerMetrics::new());
        let mut pool = CompressionPool::new(1, 9, Arc::clone(&metrics)).unwrap();

        let sources: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("svc{}.log.1", i));
                fs::write(&path, sample_content()).unwrap();
                path
            })
            .collect();
        for source in &sources {
            let _ = pool.submit(source);
        }

        assert!(pool.shutdown(Duration::from_secs(30)));
        for source in &sources {
            assert!(!source.exists());
            assert!(with_suffix(source, ".gz").exists());
        }
        assert_eq!(metrics.compressions_succeeded(), 5);
    }

    #[test]
    fn test_submit_after_shutdown_is_recorded() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("late.log.1");
        fs::write(&source, "late").unwrap();

        let metrics = Arc::new(LoggerMetrics::new());
        let mut pool = CompressionPool::new(1, 6, Arc::clone(&metrics)).unwrap();
        pool.shutdown(Duration::from_secs(1));

        let mut ticket = pool.submit(&source);
        assert_eq!(ticket.status(), JobStatus::Failed);
        assert!(source.exists());
        assert_eq!(pool.failures().len(), 1);
    }

    #[test]
    fn test_invalid_configuration() {
        let metrics = Arc::new(LoggerMetrics::new());
        assert!(CompressionPool::new(0, 6, Arc::clone(&metrics)).is_err());
        assert!(CompressionPool::new(1, 10, metrics).is_err());
    }
}
