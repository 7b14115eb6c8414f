//! Rearmable suspend deadline.
//!
//! The timer itself is plain data owned by the orchestrator and only touched
//! inside its critical section. Delivering the expiry is the job of
//! [`Lpm::run_suspend_timer`](crate::power::Lpm::run_suspend_timer), which
//! sleeps until [`deadline`](SuspendTimer::deadline) and then calls back in.

use embassy_time::{Duration, Instant};

/// `now + interval`, clamped at the end of time.
pub(crate) fn deadline_after(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval).unwrap_or(Instant::MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SuspendTimer {
    armed: bool,
    expires_at: Instant,
}

impl SuspendTimer {
    pub const fn new() -> Self {
        Self {
            armed: false,
            expires_at: Instant::MIN,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Expiry time if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.then_some(self.expires_at)
    }

    /// Arm for `now + interval`. The timer must not already be armed.
    pub fn start(&mut self, now: Instant, interval: Duration) {
        debug_assert!(!self.armed, "suspend timer started while armed");
        self.expires_at = deadline_after(now, interval);
        self.armed = true;
    }

    /// Cancel and start again.
    pub fn restart(&mut self, now: Instant, interval: Duration) {
        self.cancel();
        self.start(now, interval);
    }

    /// Push the expiry out to `now + interval` if that is later.
    ///
    /// Returns `true` if the expiry moved. An unarmed timer is armed at the
    /// candidate.
    pub fn extend(&mut self, now: Instant, interval: Duration) -> bool {
        self.extend_to(deadline_after(now, interval))
    }

    /// [`extend`](Self::extend) with an absolute candidate.
    pub fn extend_to(&mut self, candidate: Instant) -> bool {
        if !self.armed {
            self.expires_at = candidate;
            self.armed = true;
            return true;
        }
        if candidate > self.expires_at {
            self.expires_at = candidate;
            true
        } else {
            false
        }
    }

    /// Disarm. Safe to call when not armed; returns whether it was armed.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.armed;
        self.armed = false;
        was_armed
    }

    /// Consume the expiry if it is due at `now`.
    ///
    /// Returns `true` exactly once per arming, and never after a cancel.
    pub fn fire(&mut self, now: Instant) -> bool {
        if self.armed && now >= self.expires_at {
            self.armed = false;
            true
        } else {
            false
        }
    }
}

impl Default for SuspendTimer {
    fn default() -> Self {
        Self::new()
    }
}
