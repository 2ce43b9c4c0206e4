//! Fuzz target: `GameStateTracker::apply`
//!
//! Feeds a stream of (event code, payload) records into the tracker.
//! Lifecycle events must agree with the phase they leave behind.
//!
//! cargo fuzz run fuzz_tracker

#![no_main]

use libfuzzer_sys::fuzz_target;
use stagekit_bridge::app::events::LifecycleEvent;
use stagekit_bridge::game::{GamePhase, GameStateTracker};
use stagekit_bridge::protocol::EventType;

fuzz_target!(|data: &[u8]| {
    let mut tracker = GameStateTracker::new();
    let mut now = 0u64;

    // Record: [code, len, payload...]
    let mut rest = data;
    while let [code, len, tail @ ..] = rest {
        let n = (*len as usize).min(tail.len());
        let (payload, next) = tail.split_at(n);
        rest = next;
        now += 16;

        let Some(event) = EventType::from_code(*code) else {
            continue;
        };
        match tracker.apply(event, payload, now) {
            Some(LifecycleEvent::SongStarted(_)) => assert!(tracker.state().is_playing()),
            Some(LifecycleEvent::SongEnded { elapsed, .. }) => {
                let state = tracker.state();
                assert_eq!(state.phase, GamePhase::Menu);
                assert!(state.song_info().shortname.is_empty());
                assert!(elapsed.as_millis() as u64 <= now);
            }
            Some(LifecycleEvent::MetadataReady(song)) => assert!(song.is_ready()),
            None => {}
        }
    }
});
