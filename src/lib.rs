//! Low-power-mode (LPM) sleep/wake orchestrator.
//!
//! Decides when a battery-powered device may enter deep sleep, and drives
//! the single worker that performs the suspend. Everything here is
//! `no_std` and host-testable; the nRF52840 firmware in `main.rs` wires it
//! to real interrupts, an embassy timer task and the idle loop.
//!
//! Usage: `cargo test` on the host, `cargo build --features embedded
//! --release` for the firmware.
//!
//! ## Components
//!
//! - [`power::Lpm`]: the orchestrator. Owns state, suspend timer and worker
//!   slot behind one critical section; every entry point is interrupt-safe.
//! - [`machine`]: the pure transition table.
//! - [`timer::SuspendTimer`]: rearmable deadline with extend-only semantics.
//! - [`clock`]: time sources and the interrupt-of-interest timestamp.
//! - [`worker`]: the single-flight sleep worker and the suspend primitive
//!   trait.
//! - [`advice`]: busy advice and last-moment vetoes consulted before sleep.
//! - [`diag`]: fire-and-forget diagnostics sinks.
//! - [`policy`]: inactivity policy that issues sleep/awake requests.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod advice;
pub mod clock;
pub mod config;
pub mod diag;
pub mod error;
pub mod machine;
pub mod policy;
pub mod power;
pub mod power_logic;
pub mod state;
pub mod timer;
pub mod worker;

pub use advice::{BusyMask, BusyRegistry, PeriodicJobTracker, Veto, VetoFlags};
pub use clock::{Clock, EventClock, ManualClock, SystemClock};
pub use config::{LpmConfig, SecurityMode, SuspendMode};
pub use diag::{DiagEvent, Diagnostics, HistoryDiagnostics, LogDiagnostics, NoDiagnostics};
pub use error::{ConfigError, SuspendError};
pub use policy::{PolicyCommand, SleepPolicy};
pub use power::Lpm;
pub use state::{LpmAction, LpmState};
pub use timer::SuspendTimer;
pub use worker::{OsSuspendPrimitive, WorkerOutcome};
