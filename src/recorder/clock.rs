//! Time source for recording workers

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Monotonic time, wall time and sleeping, as seen by a worker
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Wall-clock time, used for segment file names
    fn wall_now(&self) -> DateTime<Local>;

    fn sleep(&self, duration: Duration);
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
pub use manual::ManualClock;
