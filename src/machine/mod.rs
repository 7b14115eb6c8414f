//! The LPM transition table.
//!
//! [`step`] is a pure function of the current state, the action and a
//! handful of facts about the rest of the system. It decides the next state
//! and the side effects (timer command, worker launch, diagnostic note);
//! [`Lpm`](crate::power::Lpm) applies them under its critical section.
//!
//! Pairs without a rule yield [`LpmState::Undefined`]. The caller then
//! replaces the step with [`recovery`].

#[cfg(test)]
mod tests;

use embassy_time::{Duration, Instant};

use crate::advice::Veto;
use crate::config::LpmConfig;
use crate::state::{LpmAction, LpmState};

/// What the table may ask about the world.
pub trait Facts {
    fn now(&self) -> Instant;
    fn last_ioi(&self) -> Instant;
    /// A sleep worker is outstanding.
    fn worker_busy(&self) -> bool;
    fn busy_count(&self) -> usize;
    /// Active last-moment veto, if any.
    fn veto(&self) -> Option<Veto>;
}

/// Suspend timer side effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerCommand {
    Keep,
    Cancel,
    /// Cancel, then start for the interval.
    Restart(Duration),
    /// Extend-only, relative to now.
    Extend(Duration),
    /// Extend-only, absolute.
    ExtendTo(Instant),
}

/// Something worth telling diagnostics that is not a state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Note {
    BusyBlocked(usize),
    Vetoed(Veto),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Step {
    pub next: LpmState,
    pub timer: TimerCommand,
    /// Take the worker slot and launch the sleep worker.
    pub launch_worker: bool,
    pub note: Option<Note>,
}

impl Step {
    const fn to(next: LpmState) -> Self {
        Self {
            next,
            timer: TimerCommand::Keep,
            launch_worker: false,
            note: None,
        }
    }

    const fn with_timer(mut self, timer: TimerCommand) -> Self {
        self.timer = timer;
        self
    }

    const fn with_note(mut self, note: Note) -> Self {
        self.note = Some(note);
        self
    }

    const fn launching_worker(mut self) -> Self {
        self.launch_worker = true;
        self
    }

    const fn illegal() -> Self {
        Self::to(LpmState::Undefined)
    }

    pub const fn is_illegal(&self) -> bool {
        matches!(self.next, LpmState::Undefined)
    }
}

/// Where an illegal transition settles: timer freshly armed for the
/// transition interval, waiting to try sleeping again.
pub const fn recovery(config: &LpmConfig) -> Step {
    Step::to(LpmState::WaitingForSleepTimer)
        .with_timer(TimerCommand::Restart(config.transition_interval))
}

/// Decide the transition for `action` in `state`.
pub fn step(state: LpmState, action: LpmAction, config: &LpmConfig, facts: &impl Facts) -> Step {
    use LpmAction as A;
    use LpmState as S;

    match (state, action) {
        (S::Undefined, _) => Step::illegal(),

        // Sleeping only leaves through resume or failure.
        (S::Sleeping, A::ResumeFromSleep) => Step::to(S::WakingUp),
        (S::Sleeping, A::SuspendFailed) => retry(config),
        (S::Sleeping, _) => Step::illegal(),

        // Every other state drops back to awake on request.
        (_, A::AwakeRequest) => Step::to(S::Awake).with_timer(TimerCommand::Cancel),

        (_, A::ResumeFromSleep) => Step::illegal(),

        (S::Awake, A::SleepRequest) => begin_quiet_period(config, facts),
        (S::Awake, _) => Step::to(S::Awake),

        (S::WaitingForSleepTimer, A::SleepRequest) => {
            let deadline = facts
                .last_ioi()
                .checked_add(config.transition_interval)
                .unwrap_or(Instant::MAX);
            Step::to(S::WaitingForSleepTimer).with_timer(TimerCommand::ExtendTo(deadline))
        }
        (S::WaitingForSleepTimer, A::SuspendTimerExpires) => {
            Step::to(S::WaitingForIdle).with_timer(TimerCommand::Cancel)
        }
        (S::WaitingForSleepTimer, A::HandleIoi) => Step::to(S::WaitingForSleepTimer)
            .with_timer(TimerCommand::Extend(config.ioi_interval)),
        (S::WaitingForSleepTimer, A::HandleLongIoi) => Step::to(S::WaitingForSleepTimer)
            .with_timer(TimerCommand::Extend(config.long_ioi_interval)),
        (S::WaitingForSleepTimer, _) => Step::to(S::WaitingForSleepTimer),

        (S::WaitingForIdle, A::SleepRequest) => begin_quiet_period(config, facts),
        (S::WaitingForIdle, A::SystemIdle) => {
            if facts.worker_busy() {
                return Step::to(S::WaitingForIdle);
            }
            match facts.busy_count() {
                0 => Step::to(S::InitiatingSleep).launching_worker(),
                busy => Step::to(S::WaitingForIdle).with_note(Note::BusyBlocked(busy)),
            }
        }
        (S::WaitingForIdle, A::HandleIoi) => reopen_quiet_period(config.ioi_interval),
        (S::WaitingForIdle, A::HandleLongIoi) => reopen_quiet_period(config.long_ioi_interval),
        (S::WaitingForIdle, _) => Step::to(S::WaitingForIdle),

        (S::InitiatingSleep, A::SleepRequest) => begin_quiet_period(config, facts),
        (S::InitiatingSleep, A::ReadyToSleepInWorker) => match facts.veto() {
            Some(veto) => Step::to(S::WaitingForPjCompletion).with_note(Note::Vetoed(veto)),
            None => Step::to(S::Sleeping),
        },
        (S::InitiatingSleep, A::HandleIoi) => reopen_quiet_period(config.ioi_interval),
        (S::InitiatingSleep, A::HandleLongIoi) => reopen_quiet_period(config.long_ioi_interval),
        (S::InitiatingSleep, A::SuspendFailed) => retry(config),
        (S::InitiatingSleep, A::SuspendSucceeded) => Step::illegal(),
        (S::InitiatingSleep, _) => Step::to(S::InitiatingSleep),

        (S::WakingUp, A::SuspendSucceeded) => match facts.veto() {
            Some(veto) => Step::to(S::WaitingForPjCompletion).with_note(Note::Vetoed(veto)),
            None => retry(config),
        },
        (S::WakingUp, A::SuspendFailed) => retry(config),
        (S::WakingUp, A::ReadyToSleepInWorker) => Step::illegal(),
        (S::WakingUp, _) => Step::to(S::WakingUp),

        (S::WaitingForPjCompletion, A::PeriodicJobsDone) => {
            Step::to(S::WaitingForIdle).with_timer(TimerCommand::Cancel)
        }
        (S::WaitingForPjCompletion, _) => Step::to(S::WaitingForPjCompletion),
    }
}

/// Sleep requested: go straight to idle if the last IOI is at least one
/// transition interval old, otherwise wait out the remainder on the timer.
fn begin_quiet_period(config: &LpmConfig, facts: &impl Facts) -> Step {
    let now = facts.now();
    let quiet_for = now.saturating_duration_since(facts.last_ioi());
    if quiet_for >= config.transition_interval {
        return Step::to(LpmState::WaitingForIdle).with_timer(TimerCommand::Cancel);
    }
    let remaining = config
        .transition_interval
        .checked_sub(quiet_for)
        .unwrap_or(Duration::from_ticks(0));
    Step::to(LpmState::WaitingForSleepTimer).with_timer(TimerCommand::Restart(remaining))
}

/// An interrupt after idle was reached starts the quiet period over.
const fn reopen_quiet_period(interval: Duration) -> Step {
    Step::to(LpmState::WaitingForSleepTimer).with_timer(TimerCommand::Restart(interval))
}

const fn retry(config: &LpmConfig) -> Step {
    Step::to(LpmState::WaitingForSleepTimer).with_timer(TimerCommand::Restart(config.retry_interval))
}
