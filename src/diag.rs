//! Diagnostics sink.
//!
//! The orchestrator reports what it does here and never looks at the
//! result. Reports are made from inside the orchestrator's critical
//! section, so a sink must not block and must not call back into the
//! orchestrator.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::HistoryBuffer;

use crate::advice::Veto;
use crate::error::SuspendError;
use crate::state::{LpmAction, LpmState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagEvent {
    /// The state changed.
    Transition {
        caller: &'static str,
        action: LpmAction,
        from: LpmState,
        to: LpmState,
    },
    /// No rule for `(from, action)`; recovery took over.
    IllegalTransition {
        caller: &'static str,
        action: LpmAction,
        from: LpmState,
    },
    /// Idle was reached but `busy` subsystems objected. Reported when the
    /// count changes, not on every idle pass.
    BusyBlocked { busy: usize },
    /// The final checkpoint refused to sleep.
    SleepVetoed { veto: Veto },
    WorkerLaunched,
    /// The worker woke up to find its sleep attempt superseded.
    WorkerPreempted { state: LpmState },
    SuspendFailed { error: SuspendError },
}

pub trait Diagnostics {
    fn report(&self, event: DiagEvent);
}

impl<T: Diagnostics + ?Sized> Diagnostics for &T {
    fn report(&self, event: DiagEvent) {
        (**self).report(event)
    }
}

/// Fan out to two sinks.
impl<A: Diagnostics, B: Diagnostics> Diagnostics for (A, B) {
    fn report(&self, event: DiagEvent) {
        self.0.report(event);
        self.1.report(event);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn report(&self, _event: DiagEvent) {}
}

/// Writes every event to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, event: DiagEvent) {
        match event {
            DiagEvent::Transition {
                caller,
                action,
                from,
                to,
            } => debug!("LPM: {:?} -> {:?} on {:?} ({})", from, to, action, caller),
            DiagEvent::IllegalTransition {
                caller,
                action,
                from,
            } => debug!(
                "LPM: illegal {:?} in {:?} from {}, recovering",
                action, from, caller
            ),
            DiagEvent::BusyBlocked { busy } => debug!("LPM: idle blocked by {} busy", busy),
            DiagEvent::SleepVetoed { veto } => info!("LPM: sleep vetoed by {:?}", veto),
            DiagEvent::WorkerLaunched => trace!("LPM: sleep worker launched"),
            DiagEvent::WorkerPreempted { state } => {
                info!("LPM: sleep worker preempted in {:?}", state)
            }
            DiagEvent::SuspendFailed { error } => warn!("LPM: suspend failed: {:?}", error),
        }
    }
}

/// Keeps the last `N` events.
pub struct HistoryDiagnostics<const N: usize> {
    events: Mutex<CriticalSectionRawMutex, RefCell<HistoryBuffer<DiagEvent, N>>>,
}

impl<const N: usize> HistoryDiagnostics<N> {
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(RefCell::new(HistoryBuffer::new())),
        }
    }

    /// Number of events retained (at most `N`).
    pub fn len(&self) -> usize {
        self.events.lock(|events| events.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent event.
    pub fn last(&self) -> Option<DiagEvent> {
        self.events.lock(|events| events.borrow().recent().copied())
    }

    /// Retained events, oldest first.
    pub fn snapshot(&self) -> heapless::Vec<DiagEvent, N> {
        self.events.lock(|events| {
            let mut out = heapless::Vec::new();
            for event in events.borrow().oldest_ordered() {
                let _ = out.push(*event);
            }
            out
        })
    }

    /// Number of retained events matching `pred`.
    pub fn count(&self, pred: impl Fn(&DiagEvent) -> bool) -> usize {
        self.events
            .lock(|events| events.borrow().oldest_ordered().filter(|e| pred(e)).count())
    }
}

impl<const N: usize> Default for HistoryDiagnostics<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Diagnostics for HistoryDiagnostics<N> {
    fn report(&self, event: DiagEvent) {
        self.events.lock(|events| events.borrow_mut().write(event));
    }
}
