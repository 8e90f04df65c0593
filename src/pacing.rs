//! Dynamic pacing of the worker polling interval.
//!
//! A background worker that polls for work has to trade latency against
//! wasted wake-ups. The [`PacingController`] adjusts the polling interval
//! geometrically from the observed duration of each unit of work: while work
//! keeps arriving the interval shrinks toward the time the work itself takes,
//! and while the worker is idle the interval stretches back out, bounded by a
//! configured maximum.

/// Geometric speed-up factor applied while work is arriving.
const SPEED_UP_FACTOR: f64 = 0.8;
/// Geometric back-off factor applied while idle.
const SLOW_DOWN_FACTOR: f64 = 1.1;
/// The interval never stretches past this multiple of the last observed
/// (positive) work duration.
const SLOW_DOWN_CAP: f64 = 9.0;

/// Computes the next sleep/poll interval from the elapsed virtual time of the
/// last unit of work. Deterministic given its input sequence; owned and
/// consulted only by its worker thread.
pub struct PacingController {
    interval_ms: f64,
    max_interval_ms: f64,
}

impl PacingController {
    pub fn new(initial_interval_ms: f64, max_interval_ms: f64) -> Self {
        // A zero interval is absorbing: both adjustment branches map zero to
        // zero, which would turn the primary worker's timed wait into a spin.
        assert!(initial_interval_ms > 0.0, "non-positive pacing interval");
        assert!(max_interval_ms > 0.0, "non-positive pacing cap");
        Self {
            interval_ms: initial_interval_ms.min(max_interval_ms),
            max_interval_ms,
        }
    }

    /// The current interval, without observing new work.
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Feed the elapsed virtual time of the last unit of work and get the
    /// interval to wait before the next one. Pass `0.0` if the worker found
    /// nothing to do.
    ///
    /// The returned interval is never negative, never exceeds the configured
    /// maximum, and each step stays within the `[0.8, 1.1]` ratio envelope of
    /// the previous interval.
    pub fn next_interval(&mut self, elapsed_ms: f64) -> f64 {
        debug_assert!(elapsed_ms >= 0.0, "negative elapsed time {}", elapsed_ms);
        if elapsed_ms > 0.0 && elapsed_ms < self.interval_ms {
            // Work is arriving faster than we are polling: speed up, but never
            // poll faster than the work itself takes.
            self.interval_ms = f64::max(self.interval_ms * SPEED_UP_FACTOR, elapsed_ms);
        } else {
            // Idle, or the unit already fills the interval: back off.
            let mut next = self.interval_ms * SLOW_DOWN_FACTOR;
            let cap = SLOW_DOWN_CAP * elapsed_ms;
            if cap > 0.0 {
                next = f64::min(next, cap);
            }
            self.interval_ms = next;
        }
        self.interval_ms = self.interval_ms.min(self.max_interval_ms);
        debug_assert!(self.interval_ms >= 0.0);
        self.interval_ms
    }
}
