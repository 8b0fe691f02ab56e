//! Cooperative cancellation shared between the controller and its workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of [`RunSignal::sleep`]
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Writable side of the run flag, held only by the controller
#[derive(Debug)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
}

impl RunFlag {
    /// A flag that starts in the running state
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Read-only view handed to workers
    pub fn signal(&self) -> RunSignal {
        RunSignal {
            running: Arc::clone(&self.running),
        }
    }

    pub fn clear(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only side of the run flag
#[derive(Debug, Clone)]
pub struct RunSignal {
    running: Arc<AtomicBool>,
}

impl RunSignal {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices, returning early once cleared
    ///
    /// Returns whether the signal is still running afterwards.
    /// A duration past the clock's range sleeps until cleared.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        while self.is_running() {
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    SLEEP_SLICE.min(deadline - now)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
        self.is_running()
    }
}

/// Poll a producer thread until it finishes, returning how long that took
///
/// `None` if it was still running after `limit`.
#[cfg(test)]
pub(crate) fn join_within(handle: std::thread::JoinHandle<()>, limit: Duration) -> Option<Duration> {
    let started = Instant::now();
    while !handle.is_finished() {
        if started.elapsed() > limit {
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.join().ok()?;
    Some(started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_observes_clear() {
        let flag = RunFlag::new();
        let signal = flag.signal();
        assert!(signal.is_running());
        flag.clear();
        assert!(!signal.is_running());
        assert!(!flag.is_running());
    }

    #[test]
    fn test_sleep_returns_early_when_cleared() {
        let flag = RunFlag::new();
        let signal = flag.signal();
        let handle = std::thread::spawn(move || {
            let started = Instant::now();
            let still_running = signal.sleep(Duration::from_secs(10));
            (still_running, started.elapsed())
        });

        std::thread::sleep(Duration::from_millis(100));
        flag.clear();
        let (still_running, elapsed) = handle.join().unwrap();
        assert!(!still_running);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_unbounded_sleep_still_cancellable() {
        let flag = RunFlag::new();
        let signal = flag.signal();
        let handle = std::thread::spawn(move || {
            signal.sleep(Duration::MAX);
        });

        std::thread::sleep(Duration::from_millis(60));
        flag.clear();
        assert!(join_within(handle, Duration::from_millis(500)).is_some());
    }
}
