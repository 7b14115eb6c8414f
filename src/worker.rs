//! Single-flight sleep worker.
//!
//! The worker is launched by the `(WaitingForIdle, SystemIdle)` rule, which
//! takes the worker slot. It runs with interrupts enabled and is the only
//! context allowed to block, because it is the one that calls the OS
//! suspend primitive. It hands the slot back on every exit path.

use crate::advice::{BusyRegistry, PeriodicJobTracker};
use crate::clock::Clock;
use crate::config::SuspendMode;
use crate::diag::{DiagEvent, Diagnostics};
use crate::error::SuspendError;
use crate::power::Lpm;
use crate::state::{LpmAction, LpmState};

/// The platform's suspend operation.
///
/// Blocks until the system has slept and woken again, or fails. It is not
/// re-entrant; the orchestrator guarantees at most one call in flight.
pub trait OsSuspendPrimitive {
    fn suspend(&mut self, mode: SuspendMode) -> Result<(), SuspendError>;
}

impl<P: OsSuspendPrimitive + ?Sized> OsSuspendPrimitive for &mut P {
    fn suspend(&mut self, mode: SuspendMode) -> Result<(), SuspendError> {
        (**self).suspend(mode)
    }
}

/// How one worker pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkerOutcome {
    /// The state had moved on before the worker ran.
    Preempted(LpmState),
    /// The final checkpoint refused to sleep; holds the resulting state.
    Deferred(LpmState),
    /// Slept and woke up.
    Slept,
    Failed(SuspendError),
}

impl<C, B, J, D> Lpm<C, B, J, D>
where
    C: Clock,
    B: BusyRegistry,
    J: PeriodicJobTracker,
    D: Diagnostics,
{
    /// Run one sleep worker pass.
    ///
    /// Re-validates `InitiatingSleep`, feeds the final checkpoint, calls
    /// `primitive` if that committed to `Sleeping`, and feeds the result
    /// back. Releases the worker slot before returning, whatever happened.
    pub fn run_sleep_worker<P>(&self, primitive: &mut P) -> WorkerOutcome
    where
        P: OsSuspendPrimitive + ?Sized,
    {
        let outcome = self.sleep_worker_pass(primitive);
        self.release_worker_slot();
        info!("LPM: sleep worker done: {:?}", outcome);
        outcome
    }

    fn sleep_worker_pass<P>(&self, primitive: &mut P) -> WorkerOutcome
    where
        P: OsSuspendPrimitive + ?Sized,
    {
        let state = self.current_state();
        if state != LpmState::InitiatingSleep {
            self.report(DiagEvent::WorkerPreempted { state });
            return WorkerOutcome::Preempted(state);
        }

        let state = self.transition(LpmAction::ReadyToSleepInWorker, "sleep-worker");
        if state != LpmState::Sleeping {
            return WorkerOutcome::Deferred(state);
        }

        match primitive.suspend(self.config().suspend_mode) {
            Ok(()) => {
                self.resume_if_sleeping();
                self.transition(LpmAction::SuspendSucceeded, "sleep-worker");
                WorkerOutcome::Slept
            }
            Err(error) => {
                self.report(DiagEvent::SuspendFailed { error });
                self.transition(LpmAction::SuspendFailed, "sleep-worker");
                WorkerOutcome::Failed(error)
            }
        }
    }

    /// Feed `ResumeFromSleep` unless the platform's resume hook already did.
    fn resume_if_sleeping(&self) {
        self.with_core(|lpm, core| {
            if core.state == LpmState::Sleeping {
                lpm.transition_locked(core, LpmAction::ResumeFromSleep, "sleep-worker");
            }
        });
    }

    /// Wait for the wake-up interrupt with the critical section held.
    ///
    /// For suspend primitives built on wait-for-interrupt. `wait` runs only
    /// if the state is still `Sleeping`; a pending interrupt makes it return
    /// at once. `ResumeFromSleep` is committed before the section is left,
    /// so the interrupt that woke the core already sees `WakingUp`.
    pub fn sleep_masked(&self, wait: impl FnOnce()) -> Result<(), SuspendError> {
        self.with_core(|lpm, core| {
            if core.state != LpmState::Sleeping {
                return Err(SuspendError::Interrupted);
            }
            wait();
            lpm.transition_locked(core, LpmAction::ResumeFromSleep, "resume");
            Ok(())
        })
    }

    /// Wait until the sleep worker is launched.
    pub async fn wait_worker_launch(&self) {
        self.worker_launch.wait().await
    }

    /// Worker task body: one pass per launch, forever.
    pub async fn run_sleep_worker_task<P>(&self, mut primitive: P) -> !
    where
        P: OsSuspendPrimitive,
    {
        loop {
            self.wait_worker_launch().await;
            self.run_sleep_worker(&mut primitive);
        }
    }
}
