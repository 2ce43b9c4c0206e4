//! RB3E wire protocol.
//!
//! Pure value types and codecs for the UDP event stream the game engine
//! broadcasts.  Nothing in here performs I/O.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Protocol Stack                        │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐   │
//! │  │ Datagram │──▶│  Codec   │──▶│ EventType dispatch    │   │
//! │  │ (bytes)  │   │ (header) │   │ → tracker / drain     │   │
//! │  └──────────┘   └──────────┘   └───────────────────────┘   │
//! │                                            │               │
//! │                      ┌─────────────────────┘               │
//! │                      ▼                                     │
//! │                 ┌──────────┐                               │
//! │                 │ StageKit │  (2-byte lighting payload)    │
//! │                 └──────────┘                               │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod event;
pub mod stagekit;

pub use codec::{decode, encode, Rb3ePacket};
pub use event::EventType;
pub use stagekit::LightingCommand;
