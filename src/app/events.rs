//! Outbound events.
//!
//! [`LifecycleEvent`]s are the subscriber contract: song start/end and
//! metadata readiness, delivered in packet-processing order.
//! [`AppEvent`] wraps them together with the supervisor's own
//! observability events for the [`EventSink`](super::ports::EventSink)
//! port.

use core::time::Duration;
use std::net::IpAddr;

use crate::protocol::LightingCommand;
use crate::supervisor::LinkState;

/// Song metadata as accumulated from the three independent fragments.
/// Any field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongInfo {
    pub artist: String,
    pub song: String,
    pub shortname: String,
}

impl SongInfo {
    /// Shortname plus at least one of song name / artist.
    pub fn is_ready(&self) -> bool {
        !self.shortname.is_empty() && (!self.song.is_empty() || !self.artist.is_empty())
    }
}

/// `Artist - Song [shortname]`, with empty parts left out.
impl core::fmt::Display for SongInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self.artist.is_empty(), self.song.is_empty()) {
            (false, false) => write!(f, "{} - {}", self.artist, self.song)?,
            (false, true) => f.write_str(&self.artist)?,
            (true, false) => f.write_str(&self.song)?,
            (true, true) => f.write_str("(unknown)")?,
        }
        if !self.shortname.is_empty() {
            write!(f, " [{}]", self.shortname)?;
        }
        Ok(())
    }
}

/// Game lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Phase went `Menu → Playing`.
    SongStarted(SongInfo),
    /// Phase went `Playing → Menu`.
    SongEnded { song: SongInfo, elapsed: Duration },
    /// Enough metadata arrived to identify the song.
    MetadataReady(SongInfo),
}

impl LifecycleEvent {
    /// Seconds spent playing, for `SongEnded`.
    pub fn elapsed_secs(&self) -> Option<f32> {
        match self {
            Self::SongEnded { elapsed, .. } => Some(elapsed.as_secs_f32()),
            _ => None,
        }
    }
}

/// Structured events emitted by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Lifecycle(LifecycleEvent),

    /// Supervisor link state changed.
    StateChanged { from: LinkState, to: LinkState },

    /// Game engine heartbeat with its build string.
    GameAlive(String),

    /// The preferred telemetry destination changed.
    PeerDiscovered(IpAddr),

    /// Safety cutoff forced every output off.
    SafetyCutoff { silent_ms: u64 },

    PeripheralAttached,
    PeripheralDetached,

    /// A lighting command reached the peripheral.
    CommandApplied(LightingCommand),

    /// The supervisor started.
    Started,
}
