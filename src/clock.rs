//! Monotonic audio clock and absolute-time scheduling
//!
//! All times handed around the engine are seconds since the clock's epoch.
//! Scheduling always converts an absolute clock value back to a deadline
//! relative to that same epoch, so repeated events never accumulate drift.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Shared handle to a clock
pub type SharedClock = Arc<dyn ClockSource>;

/// Source of monotonic time for transport and metronome
pub trait ClockSource: Send + Sync + 'static {
    /// Seconds since the clock epoch; never decreases
    fn now(&self) -> f64;

    /// Runtime deadline corresponding to an absolute clock time
    fn deadline(&self, at: f64) -> Instant;

    /// Run `callback` as close as possible to the absolute time `at`
    ///
    /// Times already in the past fire immediately. Must be called from within
    /// a tokio runtime.
    fn schedule(&self, at: f64, callback: Box<dyn FnOnce() + Send + 'static>) -> ScheduledEvent {
        let deadline = self.deadline(at);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });
        ScheduledEvent { at, handle }
    }

    /// Periodic ticker whose ticks are laid out from `start` on the epoch
    fn interval_from(&self, start: f64, period: Duration) -> Interval {
        let mut interval = tokio::time::interval_at(self.deadline(start), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }
}

/// Clock backed by the runtime's monotonic instant
///
/// Unaffected by wall-clock changes. Under a paused tokio runtime it follows
/// virtual time, which is what the engine's tests rely on.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Create a shared clock handle
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn deadline(&self, at: f64) -> Instant {
        if at <= 0.0 || !at.is_finite() {
            return self.epoch;
        }
        self.epoch + Duration::from_secs_f64(at)
    }
}

/// Handle to a pending scheduled callback
#[derive(Debug)]
pub struct ScheduledEvent {
    at: f64,
    handle: JoinHandle<()>,
}

impl ScheduledEvent {
    /// Absolute clock time the event was scheduled for
    pub fn at(&self) -> f64 {
        self.at
    }

    /// Cancel the callback if it has not fired yet
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
