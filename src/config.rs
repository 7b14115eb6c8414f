//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters of the sleep/wake orchestrator live here so they
//! can be tuned in one place. The intervals are collected into
//! [`LpmConfig`], which is fixed once the orchestrator is constructed.

use embassy_time::Duration;

use crate::error::ConfigError;

// Orchestrator intervals

/// Grace period after an interrupt of interest before sleep may proceed (ms).
pub const DEFAULT_IOI_INTERVAL_MS: u64 = 100;

/// Grace period after an interrupt from a slow-settling source (ms).
pub const DEFAULT_LONG_IOI_INTERVAL_MS: u64 = 1_000;

/// Back-off after a failed or interrupted sleep attempt (ms).
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 500;

/// Quiet period required after a sleep request before going idle (ms).
pub const DEFAULT_TRANSITION_INTERVAL_MS: u64 = 300;

// Sleep policy

/// Inactivity timeout before the policy asks for sleep (seconds).
pub const POLICY_IDLE_TIMEOUT_SECS: u64 = 60;

/// Policy evaluation period (ms).
pub const POLICY_TICK_MS: u64 = 1_000;

// Periodic jobs

/// Period of the time-keeping job (seconds).
pub const TIMEKEEPING_PERIOD_SECS: u64 = 60;

/// How long one time-keeping pass holds off sleep (ms).
pub const TIMEKEEPING_JOB_MS: u64 = 20;

/// Number of diagnostic events retained for post-mortem inspection.
pub const DIAG_HISTORY_DEPTH: usize = 32;

// GPIO pin assignments (nRF52840-DK defaults)
//
//   Button 1        → P0.11  (interrupt of interest)
//   Button 2        → P0.12  (interrupt of interest)
//   Charger detect  → P0.24  (slow-settling, long interrupt of interest)

/// Whether secure data transfers may veto sleep.
///
/// In `Production` mode the secure-transfer flag is not consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityMode {
    Production,
    Development,
}

/// Target state for the suspend primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SuspendMode {
    /// Deep sleep (DSM): core clocks stopped, RAM retained.
    DeepSleep,
    /// Light standby: core halted, clocks kept running.
    Standby,
}

/// Orchestrator configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LpmConfig {
    pub ioi_interval: Duration,
    /// Longer grace period for slow-settling interrupt sources.
    pub long_ioi_interval: Duration,
    pub retry_interval: Duration,
    pub transition_interval: Duration,
    pub security_mode: SecurityMode,
    pub suspend_mode: SuspendMode,
}

impl LpmConfig {
    /// Configuration built from the `DEFAULT_*` constants.
    pub const fn new() -> Self {
        Self {
            ioi_interval: Duration::from_millis(DEFAULT_IOI_INTERVAL_MS),
            long_ioi_interval: Duration::from_millis(DEFAULT_LONG_IOI_INTERVAL_MS),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            transition_interval: Duration::from_millis(DEFAULT_TRANSITION_INTERVAL_MS),
            security_mode: SecurityMode::Production,
            suspend_mode: SuspendMode::DeepSleep,
        }
    }

    pub const fn with_ioi_interval(mut self, interval: Duration) -> Self {
        self.ioi_interval = interval;
        self
    }

    pub const fn with_long_ioi_interval(mut self, interval: Duration) -> Self {
        self.long_ioi_interval = interval;
        self
    }

    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub const fn with_transition_interval(mut self, interval: Duration) -> Self {
        self.transition_interval = interval;
        self
    }

    pub const fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    pub const fn with_suspend_mode(mut self, mode: SuspendMode) -> Self {
        self.suspend_mode = mode;
        self
    }

    /// Check the intervals are usable.
    ///
    /// Zero intervals would turn every timer into an immediate expiry, and a
    /// long-IOI grace period shorter than the regular one defeats its purpose.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = Duration::from_ticks(0);
        if self.ioi_interval == zero {
            return Err(ConfigError::ZeroInterval("ioi_interval"));
        }
        if self.long_ioi_interval == zero {
            return Err(ConfigError::ZeroInterval("long_ioi_interval"));
        }
        if self.retry_interval == zero {
            return Err(ConfigError::ZeroInterval("retry_interval"));
        }
        if self.transition_interval == zero {
            return Err(ConfigError::ZeroInterval("transition_interval"));
        }
        if self.long_ioi_interval < self.ioi_interval {
            return Err(ConfigError::LongIoiShorterThanIoi);
        }
        Ok(())
    }
}

impl Default for LpmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration used by the firmware.
pub const LPM_CONFIG: LpmConfig = LpmConfig::new();
