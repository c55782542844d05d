use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction shared across the stack.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ns_since()/ms_since(): elapsed time from an epoch Instant
///
/// Sample records are stamped in monotonic nanoseconds measured from a single
/// per-session epoch, so every component that stamps or ages data goes through
/// this trait rather than calling `Instant::now()` directly.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Nanoseconds elapsed since `epoch`, saturating at 0 on underflow and at
    /// `u64::MAX` on overflow (585 years; unreachable in one process).
    fn ns_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        let ns = dur.as_nanos();
        ns.min(u128::from(u64::MAX)) as u64
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        let ms = dur.as_millis();
        ms.min(u128::from(u64::MAX)) as u64
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

pub mod test_clock {
    use super::*;

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn test_clock_advances_without_sleeping() {
        let clk = TestClock::new();
        let epoch = clk.now();
        clk.advance(Duration::from_millis(250));
        assert_eq!(clk.ms_since(epoch), 250);
        clk.sleep(Duration::from_millis(750));
        assert_eq!(clk.ms_since(epoch), 1000);
    }

    #[test]
    fn ns_since_matches_ms_granularity() {
        let clk = TestClock::new();
        let epoch = clk.now();
        clk.advance(Duration::from_micros(1500));
        assert_eq!(clk.ns_since(epoch), 1_500_000);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clk = MonotonicClock::new();
        let a = clk.now();
        let b = clk.now();
        assert!(b >= a);
    }
}
