//! Power manager - the low-power-mode orchestrator.
//!
//! [`Lpm`] owns the LPM state, the suspend timer and the worker slot behind
//! a single critical-section mutex. Every entry point funnels into
//! [`Lpm::transition`], which:
//!
//! 1. asks the transition table for the next step,
//! 2. swaps an illegal step for recovery,
//! 3. applies the timer command and worker launch,
//! 4. commits the new state and reports to diagnostics.
//!
//! All of it runs inside one critical section and never blocks, so the
//! entry points are safe to call from interrupt handlers. The sleep worker
//! and the timer task live in [`crate::worker`] and below.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

use crate::advice::{BusyRegistry, PeriodicJobTracker, Veto};
use crate::clock::{Clock, EventClock};
use crate::config::LpmConfig;
use crate::diag::{DiagEvent, Diagnostics};
use crate::machine::{self, Facts, Note, TimerCommand};
use crate::state::{LpmAction, LpmState};
use crate::timer::SuspendTimer;

/// State guarded by the critical section.
pub(crate) struct Core {
    pub(crate) state: LpmState,
    pub(crate) timer: SuspendTimer,
    /// Outstanding sleep workers. Never above one.
    pub(crate) worker_slots: u8,
    /// Busy count last reported as blocking idle, 0 if none.
    pub(crate) blocked_by: usize,
}

/// The sleep/wake orchestrator.
///
/// Construct once (typically as a `static`) and share by reference with
/// interrupt handlers, the idle loop, the timer task and the sleep worker.
pub struct Lpm<C, B, J, D> {
    config: LpmConfig,
    clock: C,
    busy: B,
    jobs: J,
    diag: D,
    events: EventClock,
    /// Lock-free copy of `Core::state` for `current_state()`.
    state_mirror: AtomicU8,
    core: Mutex<CriticalSectionRawMutex, RefCell<Core>>,
    pub(crate) timer_changed: Signal<CriticalSectionRawMutex, ()>,
    pub(crate) worker_launch: Signal<CriticalSectionRawMutex, ()>,
}

impl<C, B, J, D> Lpm<C, B, J, D> {
    /// Start in `Awake` with the timer disarmed and no worker outstanding.
    pub const fn new(config: LpmConfig, clock: C, busy: B, jobs: J, diag: D) -> Self {
        Self {
            config,
            clock,
            busy,
            jobs,
            diag,
            events: EventClock::new(),
            state_mirror: AtomicU8::new(LpmState::Awake.as_u8()),
            core: Mutex::new(RefCell::new(Core {
                state: LpmState::Awake,
                timer: SuspendTimer::new(),
                worker_slots: 0,
                blocked_by: 0,
            })),
            timer_changed: Signal::new(),
            worker_launch: Signal::new(),
        }
    }

    pub fn config(&self) -> &LpmConfig {
        &self.config
    }

    /// Current state, without taking the lock.
    pub fn current_state(&self) -> LpmState {
        LpmState::from_u8(self.state_mirror.load(Ordering::Acquire))
    }

    /// Timestamp of the most recent interrupt of interest.
    pub fn last_ioi(&self) -> Instant {
        self.events.last_ioi()
    }

    /// Suspend timer expiry, if armed.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.core.lock(|core| core.borrow().timer.deadline())
    }

    /// Number of outstanding sleep workers (0 or 1).
    pub fn worker_slots(&self) -> u8 {
        self.core.lock(|core| core.borrow().worker_slots)
    }

    pub(crate) fn release_worker_slot(&self) {
        self.core.lock(|core| {
            let mut core = core.borrow_mut();
            core.worker_slots = core.worker_slots.saturating_sub(1);
        });
    }
}

impl<C, B, J, D> Lpm<C, B, J, D>
where
    C: Clock,
    B: BusyRegistry,
    J: PeriodicJobTracker,
    D: Diagnostics,
{
    /// Feed `action` into the state machine and return the resulting state.
    ///
    /// `caller` names the call site for diagnostics. Never fails: an action
    /// with no rule in the current state settles in `WaitingForSleepTimer`
    /// with the timer armed for the transition interval.
    pub fn transition(&self, action: LpmAction, caller: &'static str) -> LpmState {
        self.with_core(|lpm, core| lpm.transition_locked(core, action, caller))
    }

    /// Run `f` inside the critical section with the guarded state.
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&Self, &mut Core) -> R) -> R {
        self.core.lock(|core| f(self, &mut core.borrow_mut()))
    }

    pub(crate) fn report(&self, event: DiagEvent) {
        self.diag.report(event);
    }

    pub(crate) fn transition_locked(
        &self,
        core: &mut Core,
        action: LpmAction,
        caller: &'static str,
    ) -> LpmState {
        let now = self.clock.now();
        let from = core.state;
        let facts = LiveFacts {
            lpm: self,
            now,
            worker_busy: core.worker_slots > 0,
        };

        let mut step = machine::step(from, action, &self.config, &facts);
        if step.is_illegal() {
            warn!("LPM: no rule for {:?} in {:?} ({})", action, from, caller);
            self.diag.report(DiagEvent::IllegalTransition {
                caller,
                action,
                from,
            });
            step = machine::recovery(&self.config);
        }

        // Idle is retried after every wake-up; only report a blocked idle
        // when the busy count changes.
        let blocked_by = match step.note {
            Some(Note::BusyBlocked(busy)) => busy,
            _ => 0,
        };
        if blocked_by != 0 && blocked_by != core.blocked_by {
            self.diag.report(DiagEvent::BusyBlocked { busy: blocked_by });
        }
        core.blocked_by = blocked_by;
        if let Some(Note::Vetoed(veto)) = step.note {
            self.diag.report(DiagEvent::SleepVetoed { veto });
        }

        self.apply_timer(&mut core.timer, now, step.timer);

        if step.launch_worker {
            core.worker_slots += 1;
            self.worker_launch.signal(());
            self.diag.report(DiagEvent::WorkerLaunched);
        }

        let to = step.next;
        core.state = to;
        self.state_mirror.store(to.as_u8(), Ordering::Release);
        if from != to {
            self.diag.report(DiagEvent::Transition {
                caller,
                action,
                from,
                to,
            });
        }
        to
    }

    fn apply_timer(&self, timer: &mut SuspendTimer, now: Instant, command: TimerCommand) {
        let changed = match command {
            TimerCommand::Keep => false,
            TimerCommand::Cancel => timer.cancel(),
            TimerCommand::Restart(interval) => {
                timer.restart(now, interval);
                true
            }
            TimerCommand::Extend(interval) => timer.extend(now, interval),
            TimerCommand::ExtendTo(deadline) => timer.extend_to(deadline),
        };
        if changed {
            trace!("LPM: suspend timer {:?}", timer.deadline());
            self.timer_changed.signal(());
        }
    }

    /// Policy trigger: the system should go to sleep.
    pub fn request_sleep(&self) -> LpmState {
        self.transition(LpmAction::SleepRequest, "request-sleep")
    }

    /// A wake-locking condition was detected.
    pub fn request_awake(&self) -> LpmState {
        self.transition(LpmAction::AwakeRequest, "request-awake")
    }

    /// Interrupt of interest. Callable from interrupt context.
    pub fn on_ioi(&self) -> LpmState {
        self.events.record_ioi(self.clock.now());
        self.transition(LpmAction::HandleIoi, "ioi")
    }

    /// Interrupt of interest from a slow-settling source.
    pub fn on_long_ioi(&self) -> LpmState {
        self.events.record_ioi(self.clock.now());
        self.transition(LpmAction::HandleLongIoi, "long-ioi")
    }

    pub fn on_periodic_jobs_done(&self) -> LpmState {
        self.transition(LpmAction::PeriodicJobsDone, "periodic-jobs")
    }

    /// Feed `PeriodicJobsDone` only if sleep is parked on the jobs.
    ///
    /// For jobs that run whatever the state: returns `None` and leaves the
    /// state alone unless it is `WaitingForPjCompletion`.
    pub fn periodic_jobs_finished(&self) -> Option<LpmState> {
        self.with_core(|lpm, core| {
            (core.state == LpmState::WaitingForPjCompletion).then(|| {
                lpm.transition_locked(core, LpmAction::PeriodicJobsDone, "periodic-jobs")
            })
        })
    }

    /// Platform resume hook.
    pub fn on_resume(&self) -> LpmState {
        self.transition(LpmAction::ResumeFromSleep, "resume")
    }

    /// Idle path entry point.
    ///
    /// Returns `true` if this call launched the sleep worker, in which case
    /// the idle loop should let the worker run rather than wait itself.
    pub fn idle_tick(&self) -> bool {
        self.with_core(|lpm, core| {
            let slots_before = core.worker_slots;
            lpm.transition_locked(core, LpmAction::SystemIdle, "idle");
            core.worker_slots > slots_before
        })
    }

    /// Deliver the suspend timer expiry if it is due.
    ///
    /// Returns the new state, or `None` if the timer was cancelled or moved
    /// later in the meantime.
    pub fn on_suspend_timer(&self) -> Option<LpmState> {
        self.with_core(|lpm, core| {
            let now = lpm.clock.now();
            core.timer
                .fire(now)
                .then(|| lpm.transition_locked(core, LpmAction::SuspendTimerExpires, "suspend-timer"))
        })
    }

    /// Timer task body: sleep until the deadline, deliver it, repeat.
    ///
    /// Any arm, extend or cancel wakes the task early to pick up the new
    /// deadline.
    pub async fn run_suspend_timer(&self) -> ! {
        loop {
            match self.timer_deadline() {
                Some(deadline) => {
                    if let Either::First(()) =
                        select(Timer::at(deadline), self.timer_changed.wait()).await
                    {
                        self.on_suspend_timer();
                    }
                }
                None => self.timer_changed.wait().await,
            }
        }
    }
}

/// Facts read live from the orchestrator's collaborators.
struct LiveFacts<'a, C, B, J, D> {
    lpm: &'a Lpm<C, B, J, D>,
    now: Instant,
    worker_busy: bool,
}

impl<C, B, J, D> Facts for LiveFacts<'_, C, B, J, D>
where
    B: BusyRegistry,
    J: PeriodicJobTracker,
{
    fn now(&self) -> Instant {
        self.now
    }

    fn last_ioi(&self) -> Instant {
        self.lpm.events.last_ioi()
    }

    fn worker_busy(&self) -> bool {
        self.worker_busy
    }

    fn busy_count(&self) -> usize {
        self.lpm.busy.busy_count()
    }

    fn veto(&self) -> Option<Veto> {
        self.lpm.jobs.veto(self.lpm.config.security_mode)
    }
}
