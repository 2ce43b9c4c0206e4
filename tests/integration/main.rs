//! Integration test driver for the `tests/integration/` submodules.
//!
//! `supervisor_tests` drives the controller loop against the mock ports
//! in `mock_io`; `aggregator_tests` runs the desktop aggregator over
//! loopback UDP.  Everything runs on the host with no hardware.

mod mock_io;
mod supervisor_tests;

#[cfg(not(feature = "espidf"))]
mod aggregator_tests;
