//! Rotating file sink with background compression
//!
//! On rotation the active file is renamed to a staging name that belongs to
//! that rotation alone, and a compression job for it is handed to the sink's
//! own [`CompressionPool`]. The write path never waits for a job.
//!
//! Finished generations are published in rotation order: older backups shift
//! up by one, the new artifact becomes `<path>.1.gz` (or `<path>.1` when its
//! compression failed), and anything past `max_backup_files` is deleted. A
//! generation whose job is still running holds back the ones rotated after
//! it, so slot numbers always follow rotation order.

use super::file::open_append;
use crate::core::compressor::{
    with_suffix, CompressionFailure, CompressionPool, CompressionTicket, JobStatus,
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_WORKERS,
};
use crate::core::{
    Formatter, LogEvent, LoggerError, LoggerMetrics, Result, Sink, DEFAULT_SHUTDOWN_TIMEOUT,
};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Default size threshold (512 KiB)
pub const DEFAULT_MAX_BYTES: u64 = 512 * 1024;

/// Default number of rotated files kept
pub const DEFAULT_BACKUP_COUNT: usize = 2;

/// Infix of staging names: `<path>.rotated-<seq>`
const STAGING_INFIX: &str = ".rotated-";

/// Rotation strategy defining when to rotate log files
///
/// # Examples
///
/// ```
/// use scriptorium::sinks::RotationStrategy;
/// use std::time::Duration;
///
/// // Rotate before the file would reach 1 MiB
/// let size = RotationStrategy::size(1024 * 1024);
///
/// // Rotate every hour
/// let time = RotationStrategy::time(Duration::from_secs(3600));
///
/// // Whichever comes first
/// let hybrid = RotationStrategy::hybrid(1024 * 1024, Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RotationStrategy {
    /// Rotate before a write would make the file reach `max_bytes`
    Size { max_bytes: u64 },

    /// Rotate once `interval` has elapsed since the last rotation
    Time { interval: Duration },

    /// Rotate on size OR time, whichever comes first
    Hybrid { max_bytes: u64, interval: Duration },

    /// No rotation
    Never,
}

impl Default for RotationStrategy {
    fn default() -> Self {
        RotationStrategy::Size {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl RotationStrategy {
    #[must_use]
    pub fn size(max_bytes: u64) -> Self {
        RotationStrategy::Size { max_bytes }
    }

    #[must_use]
    pub fn time(interval: Duration) -> Self {
        RotationStrategy::Time { interval }
    }

    #[must_use]
    pub fn hybrid(max_bytes: u64, interval: Duration) -> Self {
        RotationStrategy::Hybrid {
            max_bytes,
            interval,
        }
    }

    #[must_use]
    pub fn never() -> Self {
        RotationStrategy::Never
    }

    fn max_bytes(&self) -> Option<u64> {
        match self {
            RotationStrategy::Size { max_bytes } | RotationStrategy::Hybrid { max_bytes, .. } => {
                Some(*max_bytes)
            }
            _ => None,
        }
    }

    fn interval(&self) -> Option<Duration> {
        match self {
            RotationStrategy::Time { interval } | RotationStrategy::Hybrid { interval, .. } => {
                Some(*interval)
            }
            _ => None,
        }
    }
}

/// Configuration for [`RotatingFileSink`]
///
/// # Examples
///
/// ```
/// use scriptorium::sinks::{RotationPolicy, RotationStrategy};
///
/// let policy = RotationPolicy::new()
///     .with_strategy(RotationStrategy::size(50 * 1024 * 1024))
///     .with_max_backups(7)
///     .with_compression(true)
///     .with_compression_level(9);
/// ```
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    pub strategy: RotationStrategy,
    /// Rotated files kept; zero disables rotation
    pub max_backup_files: usize,
    pub compress: bool,
    /// gzip level, 0-9
    pub compression_level: u32,
    /// Compression worker threads owned by the sink
    pub max_workers: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::default(),
            max_backup_files: DEFAULT_BACKUP_COUNT,
            compress: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl RotationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_strategy(mut self, strategy: RotationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Shorthand for `with_strategy(RotationStrategy::size(size))`
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, size: u64) -> Self {
        self.strategy = RotationStrategy::Size { max_bytes: size };
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backup_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Reject values no sink could honor
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero size threshold, a zero
    /// interval, a level above 9, or zero workers with compression enabled
    pub fn validate(&self) -> Result<()> {
        if self.strategy.max_bytes() == Some(0) {
            return Err(LoggerError::config("max_bytes", "must be greater than zero"));
        }
        if self.strategy.interval() == Some(Duration::ZERO) {
            return Err(LoggerError::config(
                "rotation_interval",
                "must be greater than zero",
            ));
        }
        if self.compression_level > 9 {
            return Err(LoggerError::config(
                "compression_level",
                format!("must be between 0 and 9, got {}", self.compression_level),
            ));
        }
        if self.compress && self.max_workers == 0 {
            return Err(LoggerError::config(
                "max_workers",
                "compression needs at least one worker",
            ));
        }
        Ok(())
    }
}

/// A rotated file not yet moved into the numbered slots
struct Generation {
    staging: PathBuf,
    /// `None` when compression is disabled
    ticket: Option<CompressionTicket>,
}

/// File sink that rotates by size and/or time and gzips what it rotates out
pub struct RotatingFileSink {
    base_path: PathBuf,
    policy: RotationPolicy,
    formatter: Arc<dyn Formatter>,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    last_rotation: SystemTime,
    pool: Option<CompressionPool>,
    /// Rotated generations awaiting publication, oldest first
    in_flight: VecDeque<Generation>,
    next_staging: u64,
    rotations: u64,
}

impl RotatingFileSink {
    /// Open `path` with `policy`, counting into a private metrics instance
    ///
    /// # Errors
    ///
    /// Returns error if the policy is invalid or the file cannot be opened
    pub fn new<P: AsRef<Path>>(
        path: P,
        policy: RotationPolicy,
        formatter: Arc<dyn Formatter>,
    ) -> Result<Self> {
        Self::with_metrics(path, policy, formatter, Arc::new(LoggerMetrics::new()))
    }

    /// Open `path` with `policy`; compression outcomes go to `metrics`
    ///
    /// # Errors
    ///
    /// Returns error if the policy is invalid, the file cannot be opened or
    /// the compression workers cannot be started
    pub fn with_metrics<P: AsRef<Path>>(
        path: P,
        policy: RotationPolicy,
        formatter: Arc<dyn Formatter>,
        metrics: Arc<LoggerMetrics>,
    ) -> Result<Self> {
        policy.validate()?;
        let base_path = path.as_ref().to_path_buf();
        let (file, current_size, last_rotation) = Self::open_active(&base_path)?;

        let pool = if policy.compress {
            Some(CompressionPool::new(
                policy.max_workers,
                policy.compression_level,
                metrics,
            )?)
        } else {
            None
        };

        Ok(Self {
            base_path,
            policy,
            formatter,
            writer: Some(BufWriter::new(file)),
            current_size,
            last_rotation,
            pool,
            in_flight: VecDeque::new(),
            next_staging: 0,
            rotations: 0,
        })
    }

    fn open_active(path: &Path) -> Result<(File, u64, SystemTime)> {
        let file = open_append(path)?;
        let metadata = file.metadata().map_err(|e| {
            LoggerError::file_sink(
                path.display().to_string(),
                format!("Cannot access file metadata: {}", e),
            )
        })?;
        // Resume the time window from the file's age on reopen
        let last_rotation = metadata.modified().unwrap_or_else(|_| SystemTime::now());
        Ok((file, metadata.len(), last_rotation))
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        if self.policy.max_backup_files == 0 {
            return false;
        }

        let size_due = match self.policy.strategy.max_bytes() {
            Some(max_bytes) => self.current_size > 0 && self.current_size + incoming >= max_bytes,
            None => false,
        };
        let time_due = match self.policy.strategy.interval() {
            Some(interval) => {
                SystemTime::now()
                    .duration_since(self.last_rotation)
                    .unwrap_or(Duration::ZERO)
                    >= interval
            }
            None => false,
        };

        size_due || time_due
    }

    /// Close the active file, stage it for compression and start a new one.
    ///
    /// Only renames happen here; compression and slot shifting run later.
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to flush before rotation: {}", e),
                )
            })?;
        }

        if self.base_path.exists() {
            let staging = self.free_staging_path();
            fs::rename(&self.base_path, &staging).map_err(|e| {
                LoggerError::file_rotation(
                    self.base_path.display().to_string(),
                    format!("Failed to rotate current log file: {}", e),
                )
            })?;

            let ticket = self.pool.as_ref().map(|pool| pool.submit(&staging));
            self.in_flight.push_back(Generation { staging, ticket });
        }

        let file = open_append(&self.base_path).map_err(|e| {
            LoggerError::file_rotation(
                self.base_path.display().to_string(),
                format!("Failed to create new log file: {}", e),
            )
        })?;

        self.writer = Some(BufWriter::new(file));
        self.current_size = 0;
        self.last_rotation = SystemTime::now();
        self.rotations += 1;

        self.publish_ready();
        Ok(())
    }

    /// A staging name not used by any other generation or leftover file
    fn free_staging_path(&mut self) -> PathBuf {
        loop {
            let candidate = with_suffix(
                &self.base_path,
                &format!("{}{}", STAGING_INFIX, self.next_staging),
            );
            self.next_staging += 1;
            if !candidate.exists() && !with_suffix(&candidate, ".gz").exists() {
                return candidate;
            }
        }
    }

    /// Publish finished generations from the front of the queue.
    ///
    /// Stops at the first generation whose job is still running. Never blocks.
    fn publish_ready(&mut self) {
        while let Some(front) = self.in_flight.front_mut() {
            let status = match front.ticket {
                Some(ref mut ticket) => ticket.status(),
                None => JobStatus::Failed,
            };
            if status == JobStatus::Pending {
                break;
            }
            if let Some(generation) = self.in_flight.pop_front() {
                if let Err(e) = self.publish(&generation, status == JobStatus::Compressed) {
                    eprintln!(
                        "[LOGGER WARNING] Failed to move {} into place: {}",
                        generation.staging.display(),
                        e
                    );
                }
            }
        }
    }

    /// Shift the numbered backups up by one and move `generation` into slot 1
    fn publish(&self, generation: &Generation, compressed: bool) -> Result<()> {
        let max = self.policy.max_backup_files;

        // Oldest first: both the compressed and any uncompressed leftover
        let oldest = self.backup_path(max);
        for stale in [with_suffix(&oldest, ".gz"), oldest] {
            if stale.exists() {
                if let Err(e) = fs::remove_file(&stale) {
                    eprintln!(
                        "[LOGGER WARNING] Failed to remove oldest backup {}: {}",
                        stale.display(),
                        e
                    );
                }
            }
        }

        for i in (1..max).rev() {
            let old_path = self.backup_path(i);
            let new_path = self.backup_path(i + 1);

            Self::shift(&with_suffix(&old_path, ".gz"), &with_suffix(&new_path, ".gz"))?;
            Self::shift(&old_path, &new_path)?;
        }

        let slot = self.backup_path(1);
        if compressed {
            Self::shift(&with_suffix(&generation.staging, ".gz"), &with_suffix(&slot, ".gz"))
        } else {
            Self::shift(&generation.staging, &slot)
        }
    }

    fn shift(from: &Path, to: &Path) -> Result<()> {
        if !from.exists() {
            return Ok(());
        }
        if fs::rename(from, to).is_err() {
            // Some platforms refuse to replace an existing destination
            if to.exists() {
                let _ = fs::remove_file(to);
            }
            fs::rename(from, to).map_err(|e| {
                LoggerError::file_rotation(
                    from.display().to_string(),
                    format!("Failed to shift backup file: {}", e),
                )
            })?;
        }
        Ok(())
    }

    /// `<path>.<index>`
    pub fn backup_path(&self, index: usize) -> PathBuf {
        with_suffix(&self.base_path, &format!(".{}", index))
    }

    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Rotations performed since the sink was opened
    #[must_use]
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Compression failures recorded by this sink's pool
    pub fn compression_failures(&self) -> Vec<CompressionFailure> {
        self.pool
            .as_ref()
            .map(CompressionPool::failures)
            .unwrap_or_default()
    }

    /// Rotated generations not yet moved into the numbered slots
    #[must_use]
    pub fn unpublished(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait up to `timeout` for every outstanding compression job, then
    /// publish what finished. Returns the outcome of the latest rotation.
    pub fn wait_for_compression(&mut self, timeout: Duration) -> JobStatus {
        let deadline = Instant::now() + timeout;
        let mut latest = JobStatus::Compressed;
        for generation in self.in_flight.iter_mut() {
            latest = match generation.ticket {
                Some(ref mut ticket) => {
                    ticket.wait(deadline.saturating_duration_since(Instant::now()))
                }
                None => JobStatus::Failed,
            };
        }
        self.publish_ready();
        latest
    }

    /// Reopen the active file after a failed rotation left no writer
    fn recover_writer(&mut self) -> Result<()> {
        let (file, size, last_rotation) = Self::open_active(&self.base_path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_size = size;
        self.last_rotation = last_rotation;
        Ok(())
    }
}

impl Sink for RotatingFileSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        if self.pool.as_ref().map_or(false, |pool| !pool.is_running()) {
            return Err(LoggerError::sink_closed("rotating_file"));
        }

        let mut line = self.formatter.format(event);
        line.push('\n');
        let incoming = line.len() as u64;

        if !self.in_flight.is_empty() {
            self.publish_ready();
        }

        if self.should_rotate(incoming) {
            if let Err(e) = self.rotate() {
                // Keep logging into whatever file we can
                eprintln!(
                    "[LOGGER WARNING] Log rotation failed: {}. Continuing with current file.",
                    e
                );

                if self.writer.is_none() {
                    if let Err(reopen_err) = self.recover_writer() {
                        eprintln!(
                            "[LOGGER ERROR] Failed to reopen log file after rotation failure: {}",
                            reopen_err
                        );
                        return Err(e);
                    }
                }

                // Let the file grow past the limit rather than retry every write
                self.current_size = 0;
                self.last_rotation = SystemTime::now();
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::sink_closed("rotating_file"))?;
        writer.write_all(line.as_bytes()).map_err(|e| {
            LoggerError::file_sink(
                self.base_path.display().to_string(),
                format!("Failed to write log entry: {}", e),
            )
        })?;
        self.current_size += incoming;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush().map_err(|e| {
                LoggerError::file_sink(
                    self.base_path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
        }
        Ok(())
    }

    /// Flush, release the file, wait for outstanding compression jobs and
    /// publish every generation they finished
    fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.writer = None;

        let drained = match self.pool.take() {
            Some(mut pool) => pool.shutdown(DEFAULT_SHUTDOWN_TIMEOUT),
            None => true,
        };
        self.publish_ready();

        if !drained {
            return Err(LoggerError::shutdown_timeout(format!(
                "compression pool for {}",
                self.base_path.display()
            )));
        }
        flushed
    }

    fn name(&self) -> &str {
        "rotating_file"
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        if self.writer.is_some() || self.pool.is_some() {
            let _ = self.close();
        }
    }
}
