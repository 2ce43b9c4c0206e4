//! Platform drivers.

pub mod watchdog;

pub use watchdog::{Liveness, LivenessMonitor, StarvationAction, Watchdog};
