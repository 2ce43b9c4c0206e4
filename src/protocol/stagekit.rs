//! Stage Kit lighting payload.
//!
//! The RB3E `StageKit` event carries two bytes: the left weight (which of
//! the eight LEDs in a bank are lit) and the right weight (colour bank or
//! effect code).  The core treats the pair as opaque apart from spotting
//! the all-off code; the peripheral owns the meaning.

use core::fmt;

/// Fog machine on.
pub const SK_FOG_ON: u8 = 0x01;
/// Fog machine off.
pub const SK_FOG_OFF: u8 = 0x02;
pub const SK_STROBE_SPEED_1: u8 = 0x03;
pub const SK_STROBE_SPEED_2: u8 = 0x04;
pub const SK_STROBE_SPEED_3: u8 = 0x05;
pub const SK_STROBE_SPEED_4: u8 = 0x06;
pub const SK_STROBE_OFF: u8 = 0x07;
pub const SK_LED_BLUE: u8 = 0x20;
pub const SK_LED_GREEN: u8 = 0x40;
pub const SK_LED_YELLOW: u8 = 0x60;
pub const SK_LED_RED: u8 = 0x80;
/// Every output off (LEDs, strobe, fog).
pub const SK_ALL_OFF: u8 = 0xFF;

/// HID report id used by the peripheral's SET_REPORT transfer.
pub const HID_REPORT_ID: u8 = 0x01;
/// Fixed command byte preceding the two weights.
pub const HID_COMMAND_BYTE: u8 = 0x5A;

/// One lighting cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightingCommand {
    pub left_weight: u8,
    pub right_weight: u8,
}

impl LightingCommand {
    /// The command the safety cutoff sends.
    pub const ALL_OFF: Self = Self::new(0x00, SK_ALL_OFF);

    pub const fn new(left_weight: u8, right_weight: u8) -> Self {
        Self {
            left_weight,
            right_weight,
        }
    }

    /// Parse a `StageKit` payload.  Needs at least two bytes; extra bytes
    /// are ignored.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [left, right, ..] => Some(Self::new(*left, *right)),
            _ => None,
        }
    }

    /// Two-byte `StageKit` payload for encoding.
    pub const fn to_payload(self) -> [u8; 2] {
        [self.left_weight, self.right_weight]
    }

    /// True when this command turns every output off.
    pub const fn is_all_off(self) -> bool {
        self.right_weight == SK_ALL_OFF
    }

    /// Four-byte report handed to the USB peripheral collaborator.
    pub const fn hid_report(self) -> [u8; 4] {
        [HID_REPORT_ID, HID_COMMAND_BYTE, self.left_weight, self.right_weight]
    }

    /// Human-readable name of the right-weight code.
    pub fn effect(self) -> Effect {
        Effect::from_code(self.right_weight)
    }

    /// Iterator over lit LED positions (1-based) in the left weight.
    pub fn lit_leds(self) -> impl Iterator<Item = u8> {
        (0..8u8).filter(move |i| self.left_weight & (1 << i) != 0).map(|i| i + 1)
    }
}

/// Decoded right-weight code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    FogOn,
    FogOff,
    Strobe(u8),
    StrobeOff,
    Blue,
    Green,
    Yellow,
    Red,
    AllOff,
    Other(u8),
}

impl Effect {
    pub const fn from_code(code: u8) -> Self {
        match code {
            SK_FOG_ON => Self::FogOn,
            SK_FOG_OFF => Self::FogOff,
            SK_STROBE_SPEED_1 => Self::Strobe(1),
            SK_STROBE_SPEED_2 => Self::Strobe(2),
            SK_STROBE_SPEED_3 => Self::Strobe(3),
            SK_STROBE_SPEED_4 => Self::Strobe(4),
            SK_STROBE_OFF => Self::StrobeOff,
            SK_LED_BLUE => Self::Blue,
            SK_LED_GREEN => Self::Green,
            SK_LED_YELLOW => Self::Yellow,
            SK_LED_RED => Self::Red,
            SK_ALL_OFF => Self::AllOff,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FogOn => write!(f, "FOG ON"),
            Self::FogOff => write!(f, "FOG OFF"),
            Self::Strobe(speed) => write!(f, "STROBE {}", speed),
            Self::StrobeOff => write!(f, "STROBE OFF"),
            Self::Blue => write!(f, "BLUE"),
            Self::Green => write!(f, "GREEN"),
            Self::Yellow => write!(f, "YELLOW"),
            Self::Red => write!(f, "RED"),
            Self::AllOff => write!(f, "ALL OFF"),
            Self::Other(code) => write!(f, "0x{:02x}", code),
        }
    }
}

impl fmt::Display for LightingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LEDs:[")?;
        let mut any = false;
        for led in self.lit_leds() {
            if any {
                write!(f, ",")?;
            }
            write!(f, "{}", led)?;
            any = true;
        }
        if !any {
            write!(f, "none")?;
        }
        write!(
            f,
            "] CMD:{} (L=0x{:02x} R=0x{:02x})",
            self.effect(),
            self.left_weight,
            self.right_weight
        )
    }
}
