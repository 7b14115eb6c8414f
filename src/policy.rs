//! Inactivity sleep policy.
//!
//! Tracks user activity and whether a charger is attached, and decides when the
//! orchestrator should be asked to sleep or to stay awake. The policy only
//! issues requests; whether and when the device actually sleeps is up to
//! [`Lpm`](crate::power::Lpm).

use embassy_time::{Duration, Instant};

use crate::advice::{BusyRegistry, PeriodicJobTracker};
use crate::clock::Clock;
use crate::diag::Diagnostics;
use crate::power::Lpm;
use crate::power_logic;
use crate::state::LpmState;

/// Request for the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PolicyCommand {
    Sleep,
    Awake,
}

impl PolicyCommand {
    /// Forward to `request_sleep()` / `request_awake()`.
    pub fn apply<C, B, J, D>(self, lpm: &Lpm<C, B, J, D>) -> LpmState
    where
        C: Clock,
        B: BusyRegistry,
        J: PeriodicJobTracker,
        D: Diagnostics,
    {
        match self {
            PolicyCommand::Sleep => lpm.request_sleep(),
            PolicyCommand::Awake => lpm.request_awake(),
        }
    }
}

/// Sleep policy tracks activity and external power.
pub struct SleepPolicy {
    idle_timeout: Duration,
    last_activity: Instant,
    external_power: bool,
    sleep_requested: bool,
}

impl SleepPolicy {
    /// Create a policy; `now` counts as the last activity.
    pub const fn new(now: Instant, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last_activity: now,
            external_power: false,
            sleep_requested: false,
        }
    }

    /// Record activity (button press, incoming data).
    pub fn activity(&mut self, now: Instant) -> Option<PolicyCommand> {
        self.last_activity = now;
        if self.sleep_requested {
            info!("Policy: activity, cancelling sleep request");
            self.sleep_requested = false;
            return Some(PolicyCommand::Awake);
        }
        None
    }

    /// Update whether a charger is attached.
    pub fn set_external_power(&mut self, now: Instant, attached: bool) -> Option<PolicyCommand> {
        if self.external_power == attached {
            return None;
        }
        self.external_power = attached;
        info!("Policy: external_power={}", attached);
        self.evaluate(now)
    }

    pub fn sleep_requested(&self) -> bool {
        self.sleep_requested
    }

    /// Periodic tick - call every ~1 second.
    pub fn tick(&mut self, now: Instant) -> Option<PolicyCommand> {
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: Instant) -> Option<PolicyCommand> {
        let idle = now.saturating_duration_since(self.last_activity);
        let due = power_logic::sleep_due(
            idle.as_secs(),
            self.idle_timeout.as_secs(),
            self.external_power,
        );

        match (due, self.sleep_requested) {
            (true, false) => {
                info!("Policy: idle for {}s, requesting sleep", idle.as_secs());
                self.sleep_requested = true;
                Some(PolicyCommand::Sleep)
            }
            (false, true) => {
                info!("Policy: sleep no longer due");
                self.sleep_requested = false;
                Some(PolicyCommand::Awake)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: u64) -> Instant {
        Instant::from_secs(v)
    }

    #[test]
    fn requests_sleep_once_after_timeout() {
        let mut policy = SleepPolicy::new(secs(0), Duration::from_secs(60));
        assert_eq!(policy.tick(secs(30)), None);
        assert_eq!(policy.tick(secs(60)), Some(PolicyCommand::Sleep));
        assert_eq!(policy.tick(secs(61)), None);
        assert!(policy.sleep_requested());
    }

    #[test]
    fn activity_after_request_asks_for_awake() {
        let mut policy = SleepPolicy::new(secs(0), Duration::from_secs(60));
        policy.tick(secs(90));
        assert_eq!(policy.activity(secs(91)), Some(PolicyCommand::Awake));
        assert_eq!(policy.activity(secs(92)), None);
        assert_eq!(policy.tick(secs(100)), None);
    }

    #[test]
    fn charger_withdraws_pending_request() {
        let mut policy = SleepPolicy::new(secs(0), Duration::from_secs(60));
        policy.tick(secs(60));
        assert_eq!(
            policy.set_external_power(secs(61), true),
            Some(PolicyCommand::Awake)
        );
        assert_eq!(policy.set_external_power(secs(62), true), None);
        assert_eq!(policy.tick(secs(500)), None);
    }

    #[test]
    fn charger_removal_after_timeout_requests_sleep() {
        let mut policy = SleepPolicy::new(secs(0), Duration::from_secs(60));
        policy.set_external_power(secs(1), true);
        assert_eq!(policy.tick(secs(120)), None);
        assert_eq!(
            policy.set_external_power(secs(121), false),
            Some(PolicyCommand::Sleep)
        );
    }
}
