//! Unified error types for the bridge.
//!
//! Port traits return their own typed errors (see [`crate::app::ports`]);
//! this module funnels them into one `Error` enum so startup code and the
//! binaries can handle every subsystem uniformly.

use core::fmt;

use crate::app::ports::{LinkError, PeripheralError, TransportError};
use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A UDP socket could not be bound, read or written.
    Transport(TransportError),
    /// The network link could not be brought up.
    Link(LinkError),
    /// The Stage Kit peripheral failed.
    Peripheral(PeripheralError),
    /// The main loop stopped feeding the watchdog.
    Liveness(LivenessFault),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Peripheral(e) => write!(f, "peripheral: {e}"),
            Self::Liveness(e) => write!(f, "liveness: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(
                TransportError::Bind(e) | TransportError::Receive(e) | TransportError::Send(e),
            ) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Liveness faults
// ---------------------------------------------------------------------------

/// Watchdog starvation: no feed within the configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessFault {
    /// Milliseconds since the last feed when the fault was detected.
    pub starved_ms: u64,
    pub timeout_ms: u64,
}

impl fmt::Display for LivenessFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "main loop starved for {} ms (timeout {} ms)",
            self.starved_ms, self.timeout_ms
        )
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<PeripheralError> for Error {
    fn from(e: PeripheralError) -> Self {
        Self::Peripheral(e)
    }
}

impl From<LivenessFault> for Error {
    fn from(e: LivenessFault) -> Self {
        Self::Liveness(e)
    }
}

impl std::error::Error for TransportError {}
impl std::error::Error for LinkError {}
impl std::error::Error for PeripheralError {}
impl std::error::Error for LivenessFault {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
