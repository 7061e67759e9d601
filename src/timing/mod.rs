//! Wall-clock source for capture file names
//!
//! File names use milliseconds since the Unix epoch. The clock is a trait so
//! tests can pin the timestamp.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of Unix timestamps in milliseconds.
pub trait CaptureClock: Send + Sync {
    fn unix_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl CaptureClock for SystemClock {
    #[inline]
    fn unix_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Deterministic clock that advances by a fixed step on every read.
///
/// Successive reads never collide, which keeps generated file names unique.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    next: Arc<AtomicI64>,
    step: i64,
}

impl SteppingClock {
    pub fn new(start_millis: i64, step_millis: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(start_millis)),
            step: step_millis,
        }
    }
}

impl CaptureClock for SteppingClock {
    fn unix_millis(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.unix_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_stepping_clock_advances() {
        let clock = SteppingClock::new(1_000, 30_000);
        assert_eq!(clock.unix_millis(), 1_000);
        assert_eq!(clock.unix_millis(), 31_000);
        let shared = clock.clone();
        assert_eq!(shared.unix_millis(), 61_000);
    }
}
