//! Orchestrator states and the actions that drive them.

/// Low-power-mode state. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LpmState {
    /// Produced transiently for an illegal transition; never stored.
    Undefined = 0,
    /// Sleep is not wanted.
    Awake = 1,
    /// Sleep was requested; waiting out the quiet period on the suspend timer.
    WaitingForSleepTimer = 2,
    /// Quiet period elapsed; waiting for the system to go idle.
    WaitingForIdle = 3,
    /// The sleep worker has been launched.
    InitiatingSleep = 4,
    /// Committed to suspend; the primitive is (about to be) running.
    Sleeping = 5,
    /// The primitive returned after a wake-up.
    WakingUp = 6,
    /// A periodic job vetoed sleep; waiting for it to finish.
    WaitingForPjCompletion = 7,
}

impl LpmState {
    pub const ALL: [LpmState; 8] = [
        LpmState::Undefined,
        LpmState::Awake,
        LpmState::WaitingForSleepTimer,
        LpmState::WaitingForIdle,
        LpmState::InitiatingSleep,
        LpmState::Sleeping,
        LpmState::WakingUp,
        LpmState::WaitingForPjCompletion,
    ];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8). Unknown values map to `Undefined`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LpmState::Awake,
            2 => LpmState::WaitingForSleepTimer,
            3 => LpmState::WaitingForIdle,
            4 => LpmState::InitiatingSleep,
            5 => LpmState::Sleeping,
            6 => LpmState::WakingUp,
            7 => LpmState::WaitingForPjCompletion,
            _ => LpmState::Undefined,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            LpmState::Undefined => "undefined",
            LpmState::Awake => "awake",
            LpmState::WaitingForSleepTimer => "waiting-for-sleep-timer",
            LpmState::WaitingForIdle => "waiting-for-idle",
            LpmState::InitiatingSleep => "initiating-sleep",
            LpmState::Sleeping => "sleeping",
            LpmState::WakingUp => "waking-up",
            LpmState::WaitingForPjCompletion => "waiting-for-pj-completion",
        }
    }

    /// True while a sleep attempt is in flight (worker launched, not yet back).
    pub const fn is_suspending(self) -> bool {
        matches!(
            self,
            LpmState::InitiatingSleep | LpmState::Sleeping | LpmState::WakingUp
        )
    }
}

/// Event fed into the state machine. One per call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LpmAction {
    AwakeRequest,
    SleepRequest,
    SystemIdle,
    SuspendTimerExpires,
    ResumeFromSleep,
    HandleIoi,
    /// Interrupt from a slow-settling source.
    HandleLongIoi,
    SuspendSucceeded,
    SuspendFailed,
    /// Final checkpoint from the sleep worker.
    ReadyToSleepInWorker,
    PeriodicJobsDone,
}

impl LpmAction {
    pub const ALL: [LpmAction; 11] = [
        LpmAction::AwakeRequest,
        LpmAction::SleepRequest,
        LpmAction::SystemIdle,
        LpmAction::SuspendTimerExpires,
        LpmAction::ResumeFromSleep,
        LpmAction::HandleIoi,
        LpmAction::HandleLongIoi,
        LpmAction::SuspendSucceeded,
        LpmAction::SuspendFailed,
        LpmAction::ReadyToSleepInWorker,
        LpmAction::PeriodicJobsDone,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            LpmAction::AwakeRequest => "awake-request",
            LpmAction::SleepRequest => "sleep-request",
            LpmAction::SystemIdle => "system-idle",
            LpmAction::SuspendTimerExpires => "suspend-timer-expires",
            LpmAction::ResumeFromSleep => "resume-from-sleep",
            LpmAction::HandleIoi => "handle-ioi",
            LpmAction::HandleLongIoi => "handle-long-ioi",
            LpmAction::SuspendSucceeded => "suspend-succeeded",
            LpmAction::SuspendFailed => "suspend-failed",
            LpmAction::ReadyToSleepInWorker => "ready-to-sleep-in-worker",
            LpmAction::PeriodicJobsDone => "periodic-jobs-done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_survives_u8_encoding() {
        for state in LpmState::ALL {
            assert_eq!(LpmState::from_u8(state.as_u8()), state);
        }
        assert_eq!(LpmState::from_u8(0xFF), LpmState::Undefined);
    }

    #[test]
    fn only_worker_states_are_suspending() {
        let suspending: usize = LpmState::ALL.iter().filter(|s| s.is_suspending()).count();
        assert_eq!(suspending, 3);
        assert!(!LpmState::WaitingForPjCompletion.is_suspending());
    }
}
