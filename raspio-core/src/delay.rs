//! Blocking delays on a hosted OS
//!
//! The scheduler cannot sleep for less than a few tens of microseconds, so
//! short delays spin on the monotonic clock instead.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

/// [`DelayNs`] implementation over `std`
#[derive(Debug, Clone, Copy)]
pub struct StdDelay {
    spin_threshold: Duration,
}

impl StdDelay {
    /// Delays shorter than this spin by default
    pub const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_micros(100);

    pub const fn new() -> Self {
        Self::with_spin_threshold(Self::DEFAULT_SPIN_THRESHOLD)
    }

    pub const fn with_spin_threshold(spin_threshold: Duration) -> Self {
        Self { spin_threshold }
    }

    /// Block for at least `duration`
    pub fn wait(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        if duration >= self.spin_threshold {
            thread::sleep(duration);
            return;
        }
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

impl Default for StdDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.wait(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.wait(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.wait(Duration::from_millis(u64::from(ms)));
    }
}
