//! Stage Kit bridge library.
//!
//! Pure protocol and state logic plus the port adapters, exposed for the
//! two binaries and for integration testing.  ESP-IDF-specific code is
//! guarded by `#[cfg(feature = "espidf")]` within each module.
//!
//! Two roles share this crate:
//!
//! - **controller** (`stagekit-bridge`): [`supervisor::Supervisor`] drives
//!   one Stage Kit from the RB3E event stream.
//! - **aggregator** (`rb3e-dashboard`, host only): [`desktop::Aggregator`]
//!   tracks the game session and the controller fleet.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod discovery;
pub mod drain;
pub mod drivers;
pub mod error;
pub mod game;
pub mod idle;
pub mod protocol;
pub mod registry;
pub mod safety;
pub mod scheduler;
pub mod supervisor;

#[cfg(not(feature = "espidf"))]
pub mod desktop;

pub use error::{Error, Result};
