//! Unit tests for the transition table.
//!
//! These run on the host and exercise `step` directly with fixed facts,
//! without timers, workers or critical sections.

use embassy_time::{Duration, Instant};

use super::{recovery, step, Facts, Note, Step, TimerCommand};
use crate::advice::Veto;
use crate::config::LpmConfig;
use crate::state::{LpmAction, LpmState};

#[derive(Clone, Copy)]
struct Fixed {
    now: Instant,
    last_ioi: Instant,
    worker_busy: bool,
    busy: usize,
    veto: Option<Veto>,
}

impl Fixed {
    /// Last IOI long ago, nothing busy.
    fn quiet() -> Self {
        Self {
            now: Instant::from_secs(10),
            last_ioi: Instant::from_secs(0),
            worker_busy: false,
            busy: 0,
            veto: None,
        }
    }
}

impl Facts for Fixed {
    fn now(&self) -> Instant {
        self.now
    }
    fn last_ioi(&self) -> Instant {
        self.last_ioi
    }
    fn worker_busy(&self) -> bool {
        self.worker_busy
    }
    fn busy_count(&self) -> usize {
        self.busy
    }
    fn veto(&self) -> Option<Veto> {
        self.veto
    }
}

fn cfg() -> LpmConfig {
    LpmConfig::new()
        .with_ioi_interval(Duration::from_millis(100))
        .with_long_ioi_interval(Duration::from_millis(1_000))
        .with_retry_interval(Duration::from_millis(500))
        .with_transition_interval(Duration::from_millis(300))
}

fn run(state: LpmState, action: LpmAction, facts: Fixed) -> Step {
    step(state, action, &cfg(), &facts)
}

// ═══════════════════════════════════════════════════════════════════════════
// Totality
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn every_pair_has_exactly_one_outcome() {
    let facts = Fixed::quiet();
    for state in LpmState::ALL {
        for action in LpmAction::ALL {
            let s = run(state, action, facts);
            assert!(LpmState::ALL.contains(&s.next));
            if s.launch_worker {
                assert_eq!((state, action), (LpmState::WaitingForIdle, LpmAction::SystemIdle));
            }
        }
    }
}

#[test]
fn illegal_pairs_are_the_expected_ones() {
    let facts = Fixed::quiet();
    let mut illegal = 0;
    for state in LpmState::ALL {
        for action in LpmAction::ALL {
            if !run(state, action, facts).is_illegal() {
                continue;
            }
            illegal += 1;
            let expected = state == LpmState::Undefined
                || (state == LpmState::Sleeping
                    && !matches!(action, LpmAction::ResumeFromSleep | LpmAction::SuspendFailed))
                || (state != LpmState::Sleeping && action == LpmAction::ResumeFromSleep)
                || (state, action) == (LpmState::InitiatingSleep, LpmAction::SuspendSucceeded)
                || (state, action) == (LpmState::WakingUp, LpmAction::ReadyToSleepInWorker);
            assert!(expected, "{:?} in {:?} unexpectedly illegal", action, state);
        }
    }
    // 11 (Undefined) + 9 (Sleeping) + 6 (ResumeFromSleep elsewhere) + 2
    assert_eq!(illegal, 28);
}

#[test]
fn recovery_arms_transition_interval() {
    let s = recovery(&cfg());
    assert_eq!(s.next, LpmState::WaitingForSleepTimer);
    assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(300)));
    assert!(!s.launch_worker);
}

// ═══════════════════════════════════════════════════════════════════════════
// Awake requests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn awake_request_cancels_timer_from_any_non_sleeping_state() {
    for state in LpmState::ALL {
        if matches!(state, LpmState::Sleeping | LpmState::Undefined) {
            continue;
        }
        let s = run(state, LpmAction::AwakeRequest, Fixed::quiet());
        assert_eq!(s.next, LpmState::Awake);
        assert_eq!(s.timer, TimerCommand::Cancel);
    }
}

#[test]
fn awake_request_while_awake_is_idempotent() {
    let s = run(LpmState::Awake, LpmAction::AwakeRequest, Fixed::quiet());
    assert_eq!(s.next, LpmState::Awake);
}

// ═══════════════════════════════════════════════════════════════════════════
// Sleep requests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn sleep_request_after_quiet_period_skips_timer() {
    let facts = Fixed {
        now: Instant::from_millis(1_600),
        last_ioi: Instant::from_millis(1_000),
        ..Fixed::quiet()
    };
    let s = run(LpmState::Awake, LpmAction::SleepRequest, facts);
    assert_eq!(s.next, LpmState::WaitingForIdle);
    assert_eq!(s.timer, TimerCommand::Cancel);
}

#[test]
fn sleep_request_inside_quiet_period_waits_for_remainder() {
    let facts = Fixed {
        now: Instant::from_millis(1_100),
        last_ioi: Instant::from_millis(1_000),
        ..Fixed::quiet()
    };
    let s = run(LpmState::Awake, LpmAction::SleepRequest, facts);
    assert_eq!(s.next, LpmState::WaitingForSleepTimer);
    assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(200)));
}

#[test]
fn repeated_sleep_request_extends_to_quiet_deadline() {
    let facts = Fixed {
        now: Instant::from_millis(1_100),
        last_ioi: Instant::from_millis(1_000),
        ..Fixed::quiet()
    };
    let s = run(LpmState::WaitingForSleepTimer, LpmAction::SleepRequest, facts);
    assert_eq!(s.next, LpmState::WaitingForSleepTimer);
    assert_eq!(s.timer, TimerCommand::ExtendTo(Instant::from_millis(1_300)));
}

#[test]
fn sleep_request_supersedes_initiating_sleep() {
    let s = run(LpmState::InitiatingSleep, LpmAction::SleepRequest, Fixed::quiet());
    assert_eq!(s.next, LpmState::WaitingForIdle);
}

// ═══════════════════════════════════════════════════════════════════════════
// Interrupts of interest
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn ioi_while_waiting_for_timer_extends() {
    let s = run(LpmState::WaitingForSleepTimer, LpmAction::HandleIoi, Fixed::quiet());
    assert_eq!(s.next, LpmState::WaitingForSleepTimer);
    assert_eq!(s.timer, TimerCommand::Extend(Duration::from_millis(100)));

    let s = run(LpmState::WaitingForSleepTimer, LpmAction::HandleLongIoi, Fixed::quiet());
    assert_eq!(s.timer, TimerCommand::Extend(Duration::from_millis(1_000)));
}

#[test]
fn ioi_after_idle_reopens_quiet_period() {
    for state in [LpmState::WaitingForIdle, LpmState::InitiatingSleep] {
        let s = run(state, LpmAction::HandleIoi, Fixed::quiet());
        assert_eq!(s.next, LpmState::WaitingForSleepTimer);
        assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(100)));

        let s = run(state, LpmAction::HandleLongIoi, Fixed::quiet());
        assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(1_000)));
    }
}

#[test]
fn ioi_while_awake_changes_nothing() {
    let s = run(LpmState::Awake, LpmAction::HandleIoi, Fixed::quiet());
    assert_eq!(s.next, LpmState::Awake);
    assert_eq!(s.timer, TimerCommand::Keep);
}

// ═══════════════════════════════════════════════════════════════════════════
// Idle and worker launch
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn timer_expiry_moves_to_idle_wait() {
    let s = run(LpmState::WaitingForSleepTimer, LpmAction::SuspendTimerExpires, Fixed::quiet());
    assert_eq!(s.next, LpmState::WaitingForIdle);
}

#[test]
fn idle_launches_worker_when_nothing_is_busy() {
    let s = run(LpmState::WaitingForIdle, LpmAction::SystemIdle, Fixed::quiet());
    assert_eq!(s.next, LpmState::InitiatingSleep);
    assert!(s.launch_worker);
}

#[test]
fn idle_with_busy_subsystem_stays_and_notes_it() {
    let facts = Fixed {
        busy: 1,
        ..Fixed::quiet()
    };
    let s = run(LpmState::WaitingForIdle, LpmAction::SystemIdle, facts);
    assert_eq!(s.next, LpmState::WaitingForIdle);
    assert!(!s.launch_worker);
    assert_eq!(s.note, Some(Note::BusyBlocked(1)));
}

#[test]
fn idle_with_outstanding_worker_does_not_launch_another() {
    let facts = Fixed {
        worker_busy: true,
        ..Fixed::quiet()
    };
    let s = run(LpmState::WaitingForIdle, LpmAction::SystemIdle, facts);
    assert_eq!(s.next, LpmState::WaitingForIdle);
    assert!(!s.launch_worker);
    assert_eq!(s.note, None);
}

// ═══════════════════════════════════════════════════════════════════════════
// Final checkpoint and wake-up
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn checkpoint_without_veto_commits_to_sleep() {
    let s = run(LpmState::InitiatingSleep, LpmAction::ReadyToSleepInWorker, Fixed::quiet());
    assert_eq!(s.next, LpmState::Sleeping);
}

#[test]
fn checkpoint_with_veto_waits_for_jobs() {
    let facts = Fixed {
        veto: Some(Veto::PeriodicJob),
        ..Fixed::quiet()
    };
    let s = run(LpmState::InitiatingSleep, LpmAction::ReadyToSleepInWorker, facts);
    assert_eq!(s.next, LpmState::WaitingForPjCompletion);
    assert_eq!(s.note, Some(Note::Vetoed(Veto::PeriodicJob)));
}

#[test]
fn stale_checkpoint_does_not_sleep() {
    for state in [
        LpmState::Awake,
        LpmState::WaitingForSleepTimer,
        LpmState::WaitingForIdle,
        LpmState::WaitingForPjCompletion,
    ] {
        let s = run(state, LpmAction::ReadyToSleepInWorker, Fixed::quiet());
        assert_eq!(s.next, state);
    }
}

#[test]
fn jobs_done_reenters_idle_race() {
    let s = run(LpmState::WaitingForPjCompletion, LpmAction::PeriodicJobsDone, Fixed::quiet());
    assert_eq!(s.next, LpmState::WaitingForIdle);
    assert!(!s.launch_worker);
}

#[test]
fn resume_then_success_arms_retry() {
    let s = run(LpmState::Sleeping, LpmAction::ResumeFromSleep, Fixed::quiet());
    assert_eq!(s.next, LpmState::WakingUp);

    let s = run(LpmState::WakingUp, LpmAction::SuspendSucceeded, Fixed::quiet());
    assert_eq!(s.next, LpmState::WaitingForSleepTimer);
    assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(500)));
}

#[test]
fn success_with_running_job_waits_for_jobs() {
    let facts = Fixed {
        veto: Some(Veto::PeriodicJob),
        ..Fixed::quiet()
    };
    let s = run(LpmState::WakingUp, LpmAction::SuspendSucceeded, facts);
    assert_eq!(s.next, LpmState::WaitingForPjCompletion);
}

#[test]
fn failure_retries_after_retry_interval() {
    for state in [LpmState::InitiatingSleep, LpmState::Sleeping, LpmState::WakingUp] {
        let s = run(state, LpmAction::SuspendFailed, Fixed::quiet());
        assert_eq!(s.next, LpmState::WaitingForSleepTimer);
        assert_eq!(s.timer, TimerCommand::Restart(Duration::from_millis(500)));
    }
}

#[test]
fn late_worker_reports_leave_awake_alone() {
    for action in [LpmAction::SuspendSucceeded, LpmAction::SuspendFailed] {
        let s = run(LpmState::Awake, action, Fixed::quiet());
        assert_eq!(s.next, LpmState::Awake);
        assert_eq!(s.timer, TimerCommand::Keep);
    }
}
