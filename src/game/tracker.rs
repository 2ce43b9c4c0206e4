//! Game state tracker.
//!
//! Consumes decoded RB3E events in arrival order and turns them into
//! [`LifecycleEvent`]s.  Owns no I/O and no clock: callers pass the
//! monotonic time of processing.

use core::time::Duration;

use log::{debug, info};

use super::{decode_text, GamePhase, GameState, StateValue};
use crate::app::events::{LifecycleEvent, SongInfo};
use crate::protocol::{EventType, Rb3ePacket};

#[derive(Debug, Default)]
pub struct GameStateTracker {
    state: GameState,
    /// Last triple announced via `MetadataReady`; reset when metadata clears.
    announced: Option<SongInfo>,
    /// Build string from the most recent `Alive`.
    game_build: Option<String>,
}

impl GameStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded packet.  Unknown event codes are ignored.
    pub fn apply_packet(&mut self, packet: &Rb3ePacket<'_>, now_ms: u64) -> Option<LifecycleEvent> {
        let event = packet.event_type()?;
        self.apply(event, packet.payload, now_ms)
    }

    /// Apply one event.  Returns the lifecycle event it triggered, if any.
    pub fn apply(&mut self, event: EventType, payload: &[u8], now_ms: u64) -> Option<LifecycleEvent> {
        match event {
            EventType::State => self.apply_state(StateValue::decode(payload), now_ms),
            EventType::SongName => {
                self.state.song_name = decode_text(payload);
                self.check_ready()
            }
            EventType::SongArtist => {
                self.state.song_artist = decode_text(payload);
                self.check_ready()
            }
            EventType::SongShortname => {
                self.state.song_shortname = decode_text(payload);
                self.check_ready()
            }
            EventType::Alive => {
                let build = decode_text(payload);
                debug!("game alive: {}", build);
                self.game_build = Some(build);
                None
            }
            _ => None,
        }
    }

    fn apply_state(&mut self, value: StateValue, now_ms: u64) -> Option<LifecycleEvent> {
        let next = GamePhase::from_value(value.value());
        let prev = self.state.phase;
        if next == prev {
            return None;
        }

        let entered_prev = self.state.phase_entered_at_ms;
        self.state.phase = next;
        self.state.phase_entered_at_ms = now_ms;

        match (prev, next) {
            (GamePhase::Menu, GamePhase::Playing) => {
                let song = self.state.song_info();
                info!("song started: {}", song);
                Some(LifecycleEvent::SongStarted(song))
            }
            (GamePhase::Playing, GamePhase::Menu) => {
                let elapsed = Duration::from_millis(now_ms.saturating_sub(entered_prev));
                let song = self.state.song_info();
                self.state.clear_metadata();
                self.announced = None;
                info!("song ended after {:.1}s", elapsed.as_secs_f32());
                Some(LifecycleEvent::SongEnded { song, elapsed })
            }
            _ => {
                debug!("game phase {:?} -> {:?}", prev, next);
                None
            }
        }
    }

    fn check_ready(&mut self) -> Option<LifecycleEvent> {
        let song = self.state.song_info();
        if !song.is_ready() || self.announced.as_ref() == Some(&song) {
            return None;
        }
        debug!("metadata ready: {}", song);
        self.announced = Some(song.clone());
        Some(LifecycleEvent::MetadataReady(song))
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> GameState {
        self.state.clone()
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn game_build(&self) -> Option<&str> {
        self.game_build.as_deref()
    }
}
