//! Cancellable single-shot timer driven by the caller's clock.
//!
//! The sync layer needs exactly one pending save at a time: arming the timer
//! replaces whatever was pending. The timer holds no thread; the owner polls
//! it with the current time. Each arm gets a fresh generation so a stale
//! [`TimerHandle`] can never cancel or fire its replacement.

#[cfg(test)]
#[path = "timer_test.rs"]
mod timer_test;

use std::time::{Duration, Instant};

/// Token identifying one arming of a [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// One pending deadline, replaced on every arm.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<(TimerHandle, Instant)>,
    generation: u64,
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a fire at `now + delay`, replacing any pending deadline.
    pub fn arm(&mut self, now: Instant, delay: Duration) -> TimerHandle {
        self.generation += 1;
        let handle = TimerHandle(self.generation);
        self.pending = Some((handle, now + delay));
        handle
    }

    /// Cancel the pending deadline if `handle` still owns it.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if self.pending.is_some_and(|(h, _)| h == handle) {
            self.pending = None;
            return true;
        }
        false
    }

    /// Cancel whatever is pending.
    pub fn cancel_all(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// The pending deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, at)| at)
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the pending deadline has passed at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.pending.is_some_and(|(_, at)| now >= at)
    }

    /// Consume the deadline if it is due, returning its handle.
    pub fn fire(&mut self, now: Instant) -> Option<TimerHandle> {
        if !self.is_due(now) {
            return None;
        }
        self.pending.take().map(|(h, _)| h)
    }
}
