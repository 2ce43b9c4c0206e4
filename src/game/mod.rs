//! Game state model.
//!
//! ```text
//!            State("1") ─────────────────▶
//!   ┌──────┐                               ┌─────────┐
//!   │ Menu │                               │ Playing │
//!   └──────┘                               └─────────┘
//!            ◀───────────────── State("0")
//!            (SongEnded, metadata cleared)
//!
//!   Any other value ─▶ Other(n): stored, no lifecycle event.
//! ```

pub mod tracker;

pub use tracker::GameStateTracker;

use crate::app::events::SongInfo;

/// Game phase as reported by `State` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    #[default]
    Menu,
    Playing,
    /// Any other state value, kept verbatim.
    Other(u8),
}

impl GamePhase {
    pub const fn from_value(value: u8) -> Self {
        match value {
            0 => Self::Menu,
            1 => Self::Playing,
            n => Self::Other(n),
        }
    }

    pub const fn value(self) -> u8 {
        match self {
            Self::Menu => 0,
            Self::Playing => 1,
            Self::Other(n) => n,
        }
    }
}

/// Decoded `State` payload.
///
/// Some game builds send the state as ASCII digits, others as a raw
/// ordinal byte.  Trailing NULs are padding and are stripped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateValue {
    /// All remaining bytes were ASCII digits (value saturates at 255).
    Ascii(u8),
    /// First byte taken as a raw ordinal.
    Raw(u8),
    /// Nothing left after stripping NULs.
    Empty,
}

impl StateValue {
    pub fn decode(payload: &[u8]) -> Self {
        let trimmed = strip_trailing_nuls(payload);
        match trimmed {
            [] => Self::Empty,
            digits if digits.iter().all(u8::is_ascii_digit) => {
                let value = digits
                    .iter()
                    .fold(0u8, |acc, d| acc.saturating_mul(10).saturating_add(d - b'0'));
                Self::Ascii(value)
            }
            [first, ..] => Self::Raw(*first),
        }
    }

    pub const fn value(self) -> u8 {
        match self {
            Self::Ascii(v) | Self::Raw(v) => v,
            Self::Empty => 0,
        }
    }
}

/// Snapshot of the tracked game state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    pub phase: GamePhase,
    pub song_name: String,
    pub song_artist: String,
    pub song_shortname: String,
    /// Monotonic ms at which the current phase was entered.
    pub phase_entered_at_ms: u64,
}

impl GameState {
    pub fn song_info(&self) -> SongInfo {
        SongInfo {
            artist: self.song_artist.clone(),
            song: self.song_name.clone(),
            shortname: self.song_shortname.clone(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase == GamePhase::Playing
    }

    fn clear_metadata(&mut self) {
        self.song_name.clear();
        self.song_artist.clear();
        self.song_shortname.clear();
    }
}

pub(crate) fn strip_trailing_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Decode a metadata string payload (lossy UTF-8, trailing NULs dropped).
pub(crate) fn decode_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(strip_trailing_nuls(payload)).into_owned()
}
