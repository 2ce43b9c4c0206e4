//! Application boundary: port traits and outbound events.
//!
//! The domain modules (tracker, drain queue, supervisor, registry) never
//! touch sockets or USB directly.  All interaction with the outside world
//! happens through the **port traits** defined in [`ports`], keeping the
//! core fully testable without real peripherals or a network.

pub mod events;
pub mod ports;
