//! Wraparound-safe millisecond timing.
//!
//! The main loop reads a 32-bit millisecond tick that wraps roughly every
//! 49.7 days.  Every interval and timeout comparison in the firmware goes
//! through [`elapsed_ms`], which uses unsigned wrapping subtraction: as long
//! as the real elapsed time is below 2^32 ms, the result is exact even
//! across the wrap.

/// Milliseconds from `since` to `now`, correct across a counter wrap.
#[inline]
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// A fixed-period timer polled from the main loop.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    period_ms: u32,
    last_ms: u32,
}

impl Interval {
    /// New interval whose first period starts at `now`.
    pub fn new(period_ms: u32, now: u32) -> Self {
        Self {
            period_ms,
            last_ms: now,
        }
    }

    pub fn is_due(&self, now: u32) -> bool {
        elapsed_ms(now, self.last_ms) >= self.period_ms
    }

    /// Start a new period at `now`.
    pub fn mark(&mut self, now: u32) {
        self.last_ms = now;
    }

    /// Returns `true` and restarts the period if it has elapsed.
    pub fn poll(&mut self, now: u32) -> bool {
        if self.is_due(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn last_ms(&self) -> u32 {
        self.last_ms
    }
}
