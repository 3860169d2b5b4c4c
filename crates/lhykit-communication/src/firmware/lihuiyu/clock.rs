//! Sleep source used by holds, waits and dwells

use lhykit_core::{thread_safe_vec, ThreadSafeVec};
use std::time::Duration;

/// Blocking sleep
pub trait Clock: Send + Sync {
    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking
#[derive(Debug, Clone, Default)]
pub struct RecordingClock {
    sleeps: ThreadSafeVec<Duration>,
}

impl RecordingClock {
    /// Create a clock with no recorded sleeps
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded sleep, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of the recorded sleeps
    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}
