//! Busy advice and last-moment sleep vetoes.
//!
//! Subsystems do not talk to the state machine directly to object to
//! sleep. They raise flags here, and the state machine consults them:
//!
//! - [`BusyRegistry`] is asked when the system goes idle. Any busy
//!   subsystem keeps the orchestrator in `WaitingForIdle`.
//! - [`PeriodicJobTracker`] is asked at the final checkpoint inside the
//!   sleep worker. An active veto parks the orchestrator in
//!   `WaitingForPjCompletion` until `on_periodic_jobs_done()`.
//!
//! Both are read inside the orchestrator's critical section, so
//! implementations must be non-blocking.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::SecurityMode;

/// Well-known veto name for recurring background jobs.
pub const PERIODIC_JOB: &str = "periodic-job";

/// Well-known veto name for secure data transfers.
pub const SECURE_TRANSFER: &str = "secure-transfer";

pub trait BusyRegistry {
    /// Number of subsystems currently objecting to sleep. Zero means none.
    fn busy_count(&self) -> usize;
}

impl<T: BusyRegistry + ?Sized> BusyRegistry for &T {
    fn busy_count(&self) -> usize {
        (**self).busy_count()
    }
}

/// Reason the final pre-sleep checkpoint refused to sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Veto {
    PeriodicJob,
    SecureTransfer,
    Named(&'static str),
}

impl Veto {
    pub const fn name(&self) -> &'static str {
        match self {
            Veto::PeriodicJob => PERIODIC_JOB,
            Veto::SecureTransfer => SECURE_TRANSFER,
            Veto::Named(name) => *name,
        }
    }
}

pub trait PeriodicJobTracker {
    fn jobs_running(&self) -> bool;

    /// Only consulted outside [`SecurityMode::Production`].
    fn secure_transfer_running(&self) -> bool {
        false
    }

    /// Any further product-specific veto, by name.
    fn named_veto(&self) -> Option<&'static str> {
        None
    }

    /// First active veto, checked in order: periodic jobs, secure transfer
    /// (when allowed by `mode`), named vetoes.
    fn veto(&self, mode: SecurityMode) -> Option<Veto> {
        if self.jobs_running() {
            return Some(Veto::PeriodicJob);
        }
        if mode != SecurityMode::Production && self.secure_transfer_running() {
            return Some(Veto::SecureTransfer);
        }
        self.named_veto().map(Veto::Named)
    }
}

impl<T: PeriodicJobTracker + ?Sized> PeriodicJobTracker for &T {
    fn jobs_running(&self) -> bool {
        (**self).jobs_running()
    }

    fn secure_transfer_running(&self) -> bool {
        (**self).secure_transfer_running()
    }

    fn named_veto(&self) -> Option<&'static str> {
        (**self).named_veto()
    }

    fn veto(&self, mode: SecurityMode) -> Option<Veto> {
        (**self).veto(mode)
    }
}

/// Lock-free busy advice for up to 32 subsystems, one bit each.
#[derive(Debug, Default)]
pub struct BusyMask {
    bits: AtomicU32,
}

impl BusyMask {
    pub const CAPACITY: u8 = 32;

    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Mark `subsystem` busy or idle. Returns `false` for an id outside
    /// the mask.
    pub fn set(&self, subsystem: u8, busy: bool) -> bool {
        if subsystem >= Self::CAPACITY {
            return false;
        }
        let bit = 1u32 << subsystem;
        if busy {
            self.bits.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!bit, Ordering::AcqRel);
        }
        true
    }

    pub fn set_busy(&self, subsystem: u8) -> bool {
        self.set(subsystem, true)
    }

    pub fn clear_busy(&self, subsystem: u8) -> bool {
        self.set(subsystem, false)
    }

    pub fn is_busy(&self, subsystem: u8) -> bool {
        subsystem < Self::CAPACITY && self.bits.load(Ordering::Acquire) & (1u32 << subsystem) != 0
    }
}

impl BusyRegistry for BusyMask {
    fn busy_count(&self) -> usize {
        self.bits.load(Ordering::Acquire).count_ones() as usize
    }
}

/// Fixed set of named veto flags.
///
/// Flags named [`PERIODIC_JOB`] and [`SECURE_TRANSFER`] back the two
/// standard predicates; any other name is reported as [`Veto::Named`].
#[derive(Debug)]
pub struct VetoFlags<const N: usize> {
    names: [&'static str; N],
    flags: [AtomicBool; N],
}

impl<const N: usize> VetoFlags<N> {
    pub const fn new(names: [&'static str; N]) -> Self {
        Self {
            names,
            flags: [const { AtomicBool::new(false) }; N],
        }
    }

    /// Raise or clear the flag called `name`. Returns `false` if unknown.
    pub fn set(&self, name: &str, active: bool) -> bool {
        match self.index_of(name) {
            Some(index) => {
                self.flags[index].store(active, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.index_of(name)
            .is_some_and(|index| self.flags[index].load(Ordering::Acquire))
    }

    /// True if any flag is raised.
    pub fn any_active(&self) -> bool {
        self.flags.iter().any(|flag| flag.load(Ordering::Acquire))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| *candidate == name)
    }
}

impl<const N: usize> PeriodicJobTracker for VetoFlags<N> {
    fn jobs_running(&self) -> bool {
        self.is_active(PERIODIC_JOB)
    }

    fn secure_transfer_running(&self) -> bool {
        self.is_active(SECURE_TRANSFER)
    }

    fn named_veto(&self) -> Option<&'static str> {
        self.names
            .iter()
            .zip(self.flags.iter())
            .find(|(name, flag)| {
                **name != PERIODIC_JOB
                    && **name != SECURE_TRANSFER
                    && flag.load(Ordering::Acquire)
            })
            .map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_mask_counts_distinct_subsystems() {
        let mask = BusyMask::new();
        assert_eq!(mask.busy_count(), 0);

        mask.set_busy(0);
        mask.set_busy(5);
        mask.set_busy(5);
        assert_eq!(mask.busy_count(), 2);
        assert!(mask.is_busy(5));

        mask.clear_busy(0);
        assert_eq!(mask.busy_count(), 1);
        assert!(!mask.is_busy(0));
    }

    #[test]
    fn busy_mask_rejects_out_of_range_ids() {
        let mask = BusyMask::new();
        assert!(!mask.set_busy(32));
        assert!(!mask.is_busy(40));
        assert_eq!(mask.busy_count(), 0);
    }

    #[test]
    fn periodic_job_vetoes_in_every_mode() {
        let flags = VetoFlags::new([PERIODIC_JOB, SECURE_TRANSFER]);
        flags.set(PERIODIC_JOB, true);
        assert_eq!(flags.veto(SecurityMode::Production), Some(Veto::PeriodicJob));
        assert_eq!(flags.veto(SecurityMode::Development), Some(Veto::PeriodicJob));
    }

    #[test]
    fn secure_transfer_ignored_in_production() {
        let flags = VetoFlags::new([PERIODIC_JOB, SECURE_TRANSFER]);
        flags.set(SECURE_TRANSFER, true);
        assert_eq!(flags.veto(SecurityMode::Production), None);
        assert_eq!(
            flags.veto(SecurityMode::Development),
            Some(Veto::SecureTransfer)
        );
    }

    #[test]
    fn named_vetoes_are_reported_last() {
        let flags = VetoFlags::new([PERIODIC_JOB, "flash-write"]);
        assert!(flags.set("flash-write", true));
        assert_eq!(
            flags.veto(SecurityMode::Production),
            Some(Veto::Named("flash-write"))
        );

        flags.set(PERIODIC_JOB, true);
        assert_eq!(flags.veto(SecurityMode::Production), Some(Veto::PeriodicJob));

        assert!(!flags.set("unknown", true));
    }
}
