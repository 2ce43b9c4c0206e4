//! RB3E datagram codec.
//!
//! Wire format (big-endian header, one datagram per event):
//! ```text
//! ┌────────────┬─────────┬────────────┬──────────────┬──────────┬──────────────────┐
//! │ Magic (4B) │ Ver (1) │ Event (1)  │ PayloadSz (1)│ Plat (1) │ Payload (N B)    │
//! │ "RB3E"     │ 0       │ EventType  │ 0..=255      │          │ N = PayloadSz    │
//! └────────────┴─────────┴────────────┴──────────────┴──────────┴──────────────────┘
//! ```
//!
//! Decoding fails closed: anything that is not a well-formed RB3E
//! datagram decodes to `None`.  The network is open broadcast UDP, so
//! noise is expected and never surfaces as an error.

use super::event::EventType;

/// Protocol magic, "RB3E" in big-endian byte order.
pub const MAGIC: u32 = 0x5242_3345;

/// The only protocol version this codec speaks.
pub const PROTOCOL_VERSION: u8 = 0;

/// Fixed header size.
pub const HEADER_SIZE: usize = 8;

/// Hard protocol ceiling on payload length (one length byte).
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Largest datagram the protocol can express.
pub const MAX_DATAGRAM: usize = HEADER_SIZE + MAX_PAYLOAD;

/// Stack-allocated encoded datagram.
pub type Datagram = heapless::Vec<u8, MAX_DATAGRAM>;

/// A decoded datagram.  The payload borrows from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rb3ePacket<'a> {
    pub version: u8,
    /// Raw event code; see [`Rb3ePacket::event_type`].
    pub event_code: u8,
    pub platform: u8,
    pub payload: &'a [u8],
}

impl<'a> Rb3ePacket<'a> {
    /// Known event type, or `None` for codes this build does not understand.
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_code(self.event_code)
    }
}

/// Decode one datagram.
///
/// Returns `None` for buffers shorter than the header, a magic or version
/// mismatch, or a payload shorter than the declared size.  Trailing bytes
/// past the declared payload are ignored.
pub fn decode(bytes: &[u8]) -> Option<Rb3ePacket<'_>> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }

    let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != MAGIC {
        return None;
    }

    let version = bytes[4];
    if version != PROTOCOL_VERSION {
        return None;
    }

    let event_code = bytes[5];
    let payload_size = bytes[6] as usize;
    let platform = bytes[7];

    let payload = bytes.get(HEADER_SIZE..HEADER_SIZE + payload_size)?;

    Some(Rb3ePacket {
        version,
        event_code,
        platform,
        payload,
    })
}

/// Encode a datagram into `out_buf`.
///
/// Returns the number of bytes written, or `None` if the payload exceeds
/// [`MAX_PAYLOAD`] or `out_buf` is too small.
pub fn encode_into(
    event_type: EventType,
    platform: u8,
    payload: &[u8],
    out_buf: &mut [u8],
) -> Option<usize> {
    if payload.len() > MAX_PAYLOAD {
        return None;
    }
    let total = HEADER_SIZE + payload.len();
    if total > out_buf.len() {
        return None;
    }

    out_buf[..4].copy_from_slice(&MAGIC.to_be_bytes());
    out_buf[4] = PROTOCOL_VERSION;
    out_buf[5] = event_type.code();
    out_buf[6] = payload.len() as u8;
    out_buf[7] = platform;
    out_buf[HEADER_SIZE..total].copy_from_slice(payload);

    Some(total)
}

/// Encode a datagram with platform byte 0.
///
/// `None` only when `payload` is longer than [`MAX_PAYLOAD`].
pub fn encode(event_type: EventType, payload: &[u8]) -> Option<Datagram> {
    encode_with_platform(event_type, 0, payload)
}

/// Encode a datagram with an explicit platform byte.
pub fn encode_with_platform(event_type: EventType, platform: u8, payload: &[u8]) -> Option<Datagram> {
    let mut buf = [0u8; MAX_DATAGRAM];
    let n = encode_into(event_type, platform, payload, &mut buf)?;
    Datagram::from_slice(&buf[..n]).ok()
}
