//! Scheduler time base
//!
//! All horizon arithmetic runs on a single monotonic clock measured in
//! microseconds, held as `f64` so predictions and wall time mix freely.
//! The clock is injectable: the real scheduler uses [`MonotonicClock`],
//! tests drive a [`ManualClock`] to get exact expected horizons.

use crossbeam::atomic::AtomicCell;
use std::time::Instant;

/// Monotonic time source, in microseconds.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since an arbitrary origin.
    fn now_us(&self) -> f64;
}

/// Wall clock backed by [`Instant`], origin at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock with its origin at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1e6
    }
}

/// Hand-advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicCell<f64>,
}

impl ManualClock {
    /// Create a manual clock starting at 0 µs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manual clock starting at `us` microseconds.
    pub fn starting_at(us: f64) -> Self {
        Self {
            now: AtomicCell::new(us),
        }
    }

    /// Move the clock forward by `us` microseconds.
    pub fn advance(&self, us: f64) {
        self.now.store(self.now.load() + us);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, us: f64) {
        self.now.store(us);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> f64 {
        self.now.load()
    }
}
