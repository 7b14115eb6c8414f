//! Time sources and the interrupt-of-interest event clock.

use core::sync::atomic::Ordering;

use embassy_time::{Duration, Instant};
use portable_atomic::AtomicU64;

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Clock backed by the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. For simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    pub const fn starting_at(at: Instant) -> Self {
        Self {
            ticks: AtomicU64::new(at.as_ticks()),
        }
    }

    pub fn set(&self, at: Instant) {
        self.ticks.store(at.as_ticks(), Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.ticks.fetch_add(by.as_ticks(), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.ticks.load(Ordering::Acquire))
    }
}

/// Timestamp of the most recent interrupt of interest.
///
/// Written from interrupt context without the orchestrator lock. The stored
/// value never decreases, so a transition that reads it mid-update sees
/// either the old or the new timestamp, both valid.
#[derive(Debug, Default)]
pub struct EventClock {
    last_ioi: AtomicU64,
}

impl EventClock {
    /// No interrupt seen yet: the last IOI is at the start of time.
    pub const fn new() -> Self {
        Self {
            last_ioi: AtomicU64::new(0),
        }
    }

    /// Record an interrupt of interest at `now`. Never blocks.
    pub fn record_ioi(&self, now: Instant) {
        self.last_ioi.fetch_max(now.as_ticks(), Ordering::AcqRel);
    }

    pub fn last_ioi(&self) -> Instant {
        Instant::from_ticks(self.last_ioi.load(Ordering::Acquire))
    }

    /// Time elapsed since the last IOI, zero if `now` is not after it.
    pub fn since_last_ioi(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_ioi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_ioi_never_moves_backwards() {
        let clock = EventClock::new();
        clock.record_ioi(Instant::from_millis(50));
        clock.record_ioi(Instant::from_millis(20));
        assert_eq!(clock.last_ioi(), Instant::from_millis(50));

        clock.record_ioi(Instant::from_millis(80));
        assert_eq!(clock.last_ioi(), Instant::from_millis(80));
    }

    #[test]
    fn since_last_ioi_saturates() {
        let clock = EventClock::new();
        clock.record_ioi(Instant::from_millis(100));
        assert_eq!(
            clock.since_last_ioi(Instant::from_millis(40)),
            Duration::from_ticks(0)
        );
        assert_eq!(
            clock.since_last_ioi(Instant::from_millis(400)),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::starting_at(Instant::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Instant::from_millis(15));
        clock.set(Instant::from_secs(2));
        assert_eq!(clock.now(), Instant::from_secs(2));
    }
}
