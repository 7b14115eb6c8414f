//! Error types for the orchestrator.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.
//!
//! Illegal state transitions are not errors: they are reported through
//! [`Diagnostics`](crate::diag::Diagnostics) and recovered from in place.

use core::fmt;

/// Failure reported by the OS suspend primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SuspendError {
    /// A wake-up source fired before the hardware reached sleep.
    Interrupted,

    /// A device refused to suspend.
    Busy,

    /// Platform-specific error code.
    Hardware(u32),
}

impl fmt::Display for SuspendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspendError::Interrupted => f.write_str("suspend interrupted by a wake-up source"),
            SuspendError::Busy => f.write_str("a device refused to suspend"),
            SuspendError::Hardware(code) => write!(f, "suspend failed with code {code:#x}"),
        }
    }
}

/// Rejected [`LpmConfig`](crate::config::LpmConfig).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The named interval is zero.
    ZeroInterval(&'static str),

    /// `long_ioi_interval` is shorter than `ioi_interval`.
    LongIoiShorterThanIoi,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroInterval(name) => write!(f, "{name} must be non-zero"),
            ConfigError::LongIoiShorterThanIoi => {
                f.write_str("long_ioi_interval is shorter than ioi_interval")
            }
        }
    }
}
