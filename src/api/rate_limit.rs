//! Sliding-window rate limiter for remote API calls
//!
//! Enforces a maximum of N calls per rolling W-second window by blocking the
//! calling thread until the oldest of the last N calls falls outside the
//! window. The pipeline is single-threaded, so a blocking sleep is the whole
//! suspension story.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source seam so tests can drive a simulated clock.
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;
    /// Block for the given duration
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-size sliding window over the instants of the last N calls.
pub struct RateLimiter<C: Clock = SystemClock> {
    max_calls: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter allowing `max_calls` per rolling `window`
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self::with_clock(max_calls, window, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter with an explicit time source
    pub fn with_clock(max_calls: usize, window: Duration, clock: C) -> Self {
        Self {
            max_calls,
            window,
            timestamps: VecDeque::with_capacity(max_calls),
            clock,
        }
    }

    /// Block until the next call is allowed, then record it.
    ///
    /// While fewer than `max_calls` calls have been made the call proceeds
    /// immediately. Once the window is full, the call waits out the remainder
    /// of the window measured from the oldest recorded call, then the oldest
    /// timestamp is dropped and the new one appended.
    pub fn acquire(&mut self) {
        if self.max_calls == 0 {
            return;
        }

        if self.timestamps.len() < self.max_calls {
            self.timestamps.push_back(self.clock.now());
            return;
        }

        if let Some(&oldest) = self.timestamps.front() {
            let elapsed = self.clock.now().saturating_duration_since(oldest);
            if elapsed < self.window {
                let wait = self.window - elapsed;
                debug!(wait_secs = wait.as_secs_f64(), "rate limit window full, waiting");
                self.clock.sleep(wait);
            }
        }

        self.timestamps.pop_front();
        self.timestamps.push_back(self.clock.now());
    }

    /// Number of calls currently tracked in the window
    pub fn calls_in_window(&self) -> usize {
        self.timestamps.len()
    }
}
