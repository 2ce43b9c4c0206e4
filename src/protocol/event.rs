//! RB3E event type codes.

/// Event carried in header byte 5.
///
/// Codes are stable; anything not listed here is a forward-compatible
/// no-op and decodes to `None` via [`EventType::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    /// Game engine heartbeat; payload is the build string.
    Alive = 0,
    /// Menu / playing phase change.
    State = 1,
    SongName = 2,
    SongArtist = 3,
    SongShortname = 4,
    Score = 5,
    /// Lighting cue for the Stage Kit peripheral.
    StageKit = 6,
    BandInfo = 7,
    VenueName = 8,
    ScreenName = 9,
    DxData = 10,
}

impl EventType {
    /// Map a raw header byte to a known event type.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Alive),
            1 => Some(Self::State),
            2 => Some(Self::SongName),
            3 => Some(Self::SongArtist),
            4 => Some(Self::SongShortname),
            5 => Some(Self::Score),
            6 => Some(Self::StageKit),
            7 => Some(Self::BandInfo),
            8 => Some(Self::VenueName),
            9 => Some(Self::ScreenName),
            10 => Some(Self::DxData),
            _ => None,
        }
    }

    /// Raw header byte for this event type.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for the three independent song-metadata fragments.
    pub const fn is_song_metadata(self) -> bool {
        matches!(self, Self::SongName | Self::SongArtist | Self::SongShortname)
    }
}
