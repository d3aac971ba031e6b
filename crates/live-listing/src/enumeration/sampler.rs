//! Time-based sampler gating intermediate flushes.

use std::time::{Duration, Instant};

/// Says "now" at most once per interval.
#[derive(Debug)]
pub struct IntervalSampler {
    interval: Duration,
    last: Instant,
}

impl IntervalSampler {
    /// The first interval starts at construction.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self { interval, last: start }
    }

    /// True if a full interval has passed since the last time this returned true.
    pub fn check_now(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
