//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC on the device, stderr on the host).

use log::{info, warn};

use crate::app::events::{AppEvent, LifecycleEvent};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Lifecycle(LifecycleEvent::SongStarted(s)) => {
                info!("SONG  | started | {}", s);
            }
            AppEvent::Lifecycle(LifecycleEvent::SongEnded { song, elapsed }) => {
                info!("SONG  | ended | {} after {:.1}s", song, elapsed.as_secs_f32());
            }
            AppEvent::Lifecycle(LifecycleEvent::MetadataReady(s)) => {
                info!("SONG  | metadata | {}", s);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::GameAlive(build) => {
                info!("GAME  | alive | {}", build);
            }
            AppEvent::PeerDiscovered(addr) => {
                info!("PEER  | aggregator at {}", addr);
            }
            AppEvent::SafetyCutoff { silent_ms } => {
                warn!("SAFE  | all off after {} ms of silence", silent_ms);
            }
            AppEvent::PeripheralAttached => info!("USB   | Stage Kit attached"),
            AppEvent::PeripheralDetached => warn!("USB   | Stage Kit detached"),
            AppEvent::CommandApplied(cmd) => {
                log::debug!("LIGHT | {}", cmd);
            }
            AppEvent::Started => info!("START | supervisor running"),
        }
    }
}
