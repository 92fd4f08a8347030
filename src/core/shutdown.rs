//! Bounded joins for background threads

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default bound for joining background threads on teardown (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Join `handle`, giving up after `timeout`.
///
/// Returns `false` if the thread panicked or did not finish in time. A thread
/// that misses the bound is detached, never waited on indefinitely.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, what: &str) -> bool {
    let start = Instant::now();

    loop {
        if handle.is_finished() {
            // Thread finished, join it to check for panics
            if let Err(e) = handle.join() {
                eprintln!("[LOGGER ERROR] {} panicked during shutdown: {:?}", what, e);
                return false;
            }
            return true;
        }

        if start.elapsed() >= timeout {
            eprintln!(
                "[LOGGER WARNING] {} did not finish within {:?}. Abandoning join.",
                what, timeout
            );
            return false;
        }

        // Small sleep to avoid busy-waiting
        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let handle = thread::spawn(|| {});
        assert!(join_with_timeout(handle, Duration::from_secs(1), "worker"));
    }

    #[test]
    fn test_join_gives_up_after_timeout() {
        let handle = thread::spawn(|| thread::sleep(Duration::from_millis(500)));
        let start = Instant::now();
        assert!(!join_with_timeout(handle, Duration::from_millis(20), "sleeper"));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_join_reports_panic() {
        let handle = thread::spawn(|| panic!("boom"));
        assert!(!join_with_timeout(handle, Duration::from_secs(1), "panicker"));
    }
}
