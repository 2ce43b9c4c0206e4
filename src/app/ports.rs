//! Port traits: the hexagonal boundary between the bridge core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Supervisor / aggregator threads (domain)
//! ```
//!
//! Driven adapters (UDP sockets, network link, Stage Kit peripheral,
//! watchdog, event sinks) implement these traits.  The
//! [`Supervisor`](crate::supervisor::Supervisor) consumes them via
//! generics, so the core never touches a socket or USB handle directly.
//!
//! ## Failure notes
//!
//! - "Nothing available" is [`Recv::Empty`], never an error.
//! - Port errors are transient by contract: the supervisor logs them and
//!   retries on its own schedule.  Only startup code treats them as fatal.

use core::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::protocol::LightingCommand;

use super::events::{AppEvent, LifecycleEvent};

// ───────────────────────────────────────────────────────────────
// Non-blocking poll result
// ───────────────────────────────────────────────────────────────

/// Result of a non-blocking poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv<T> {
    /// A value was available.
    Ready(T),
    /// Nothing buffered right now.
    Empty,
}

impl<T> Recv<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Recv<U> {
        match self {
            Self::Ready(v) => Recv::Ready(f(v)),
            Self::Empty => Recv::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: UDP sockets)
// ───────────────────────────────────────────────────────────────

/// The two UDP endpoints a controller owns: the RB3E event port and the
/// status port (telemetry out, discovery hints in).
pub trait NetPort {
    /// (Re)bind both sockets.  Called after every link (re)connection.
    fn reopen(&mut self) -> Result<(), TransportError>;

    /// Non-blocking receive from the event socket.
    /// Returns the datagram length written into `buf`.
    fn recv_event(&mut self, buf: &mut [u8]) -> Result<Recv<usize>, TransportError>;

    /// Non-blocking receive from the status socket.
    /// Returns the datagram length and the sender's IP.
    fn recv_status(&mut self, buf: &mut [u8]) -> Result<Recv<(usize, IpAddr)>, TransportError>;

    /// Best-effort send from the status socket.
    fn send_status(&mut self, payload: &[u8], dest: SocketAddr) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: WiFi / network interface)
// ───────────────────────────────────────────────────────────────

/// Network link (WiFi station, Ethernet, host interface).
pub trait LinkPort {
    /// Attempt to bring the link up.  Must return within a bounded time.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Whether the link is currently usable.
    fn is_connected(&self) -> bool;

    /// Refresh cached link state.  Called once per supervisor tick.
    fn poll(&mut self);

    /// Signal strength in dBm, when the link has one.
    fn rssi(&self) -> Option<i8>;

    /// Local IPv4 address while connected.
    fn local_addr(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// Stage Kit port (driven adapter: domain → lighting peripheral)
// ───────────────────────────────────────────────────────────────

/// The lighting peripheral.  Adapters own framing and transport; the
/// core only supplies the two weights.
pub trait StageKitPort {
    /// Whether the peripheral is attached and claimed.
    fn is_attached(&self) -> bool;

    /// Try to find and claim the peripheral.
    fn try_attach(&mut self) -> Result<(), PeripheralError>;

    /// Deliver one command.  An adapter that loses the device reports
    /// [`PeripheralError::Detached`] and must answer `is_attached() == false`
    /// afterwards.
    fn send(&mut self, command: LightingCommand) -> Result<(), PeripheralError>;
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

/// Liveness timer the main loop must touch every tick.
pub trait WatchdogPort {
    fn feed(&self);
}

// ───────────────────────────────────────────────────────────────
// Memory port (constrained role only)
// ───────────────────────────────────────────────────────────────

/// Heap introspection and reclamation.
pub trait MemoryPort {
    /// Free heap bytes, if the platform can tell.
    fn free_bytes(&self) -> Option<usize>;

    /// Run a reclamation pass.
    fn reclaim(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (serial log, UI callback, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Lifecycle subscriber port (driving collaborators: UI, video, scrobbling)
// ───────────────────────────────────────────────────────────────

/// Receives lifecycle events on the aggregator's dispatch thread, in
/// packet-processing order.  Implementations may be slow; no lock is
/// held while they run.
pub trait LifecycleSubscriber: Send {
    fn on_lifecycle(&mut self, event: &LifecycleEvent);
}

impl<F> LifecycleSubscriber for F
where
    F: FnMut(&LifecycleEvent) + Send,
{
    fn on_lifecycle(&mut self, event: &LifecycleEvent) {
        self(event)
    }
}

// ───────────────────────────────────────────────────────────────
// Interval delegate (decouples the interval table from the supervisor)
// ───────────────────────────────────────────────────────────────

/// Callback the [`IntervalTable`](crate::scheduler::IntervalTable)
/// invokes for every periodic task that came due this tick.
pub trait IntervalDelegate {
    fn on_interval(&mut self, task: PeriodicTask, now_ms: u64);
}

/// Periodic activities of the cooperative loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicTask {
    /// Receive statistics log.
    Heartbeat,
    /// Status report to the aggregator.
    Telemetry,
    /// Peripheral re-attachment attempt.
    PeripheralRetry,
    /// Link re-establishment attempt.
    LinkRetry,
    /// Fleet registry aging (aggregator).
    RegistrySweep,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`NetPort`] operations.
#[derive(Debug)]
pub enum TransportError {
    /// Socket could not be bound (port in use, no permission).
    Bind(std::io::Error),
    /// Receive failed for a reason other than "no data".
    Receive(std::io::Error),
    /// Send failed (interface busy, no route).
    Send(std::io::Error),
    /// Operation attempted while the sockets are closed.
    NotOpen,
}

/// Errors from [`LinkPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    NoCredentials,
    /// SSID or passphrase outside what the radio accepts.
    InvalidCredentials,
    /// No usable interface / route.
    Unavailable,
    /// The attempt did not finish in its bounded window.
    Timeout,
    ConnectionFailed,
}

/// Errors from [`StageKitPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralError {
    /// No matching device on the bus.
    NotFound,
    /// Device present but not a Stage Kit.
    WrongDevice,
    /// Device went away mid-operation.
    Detached,
    /// Transfer failed or was short.
    TransferFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "bind failed: {}", e),
            Self::Receive(e) => write!(f, "receive failed: {}", e),
            Self::Send(e) => write!(f, "send failed: {}", e),
            Self::NotOpen => write!(f, "socket not open"),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no link credentials configured"),
            Self::InvalidCredentials => write!(f, "SSID must be 1-32 printable bytes, passphrase 8-64 bytes or empty"),
            Self::Unavailable => write!(f, "no usable network interface"),
            Self::Timeout => write!(f, "link connect timed out"),
            Self::ConnectionFailed => write!(f, "link connection failed"),
        }
    }
}

impl fmt::Display for PeripheralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Stage Kit not found"),
            Self::WrongDevice => write!(f, "device is not a Stage Kit"),
            Self::Detached => write!(f, "Stage Kit detached"),
            Self::TransferFailed => write!(f, "control transfer failed"),
        }
    }
}
