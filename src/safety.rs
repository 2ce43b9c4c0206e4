//! Lighting safety cutoff.
//!
//! If the game stops sending lighting cues while lights are on (crash,
//! network drop, console switched off), the rig must not stay lit.
//!
//! ## Cutoff lifecycle
//!
//! 1. A lighting command arrives; [`SafetyCutoff::note_command`] stamps it.
//! 2. Delivery succeeds; [`SafetyCutoff::note_delivered`] marks lights
//!    active unless the command was all-off.
//! 3. Each tick, [`SafetyCutoff::check`] compares the silence against the
//!    cutoff.  On expiry it reports once and clears the active flag, so
//!    the forced all-off is sent exactly once per silence.

use log::warn;

use crate::protocol::LightingCommand;

#[derive(Debug)]
pub struct SafetyCutoff {
    cutoff_ms: u64,
    /// Time of the last lighting command received (delivered or not).
    last_command_ms: u64,
    lights_active: bool,
    trips: u32,
}

impl SafetyCutoff {
    pub fn new(cutoff_ms: u64) -> Self {
        Self {
            cutoff_ms,
            last_command_ms: 0,
            lights_active: false,
            trips: 0,
        }
    }

    /// A lighting command was received at `now_ms`.
    pub fn note_command(&mut self, now_ms: u64) {
        self.last_command_ms = now_ms;
    }

    /// `cmd` reached the peripheral.
    pub fn note_delivered(&mut self, cmd: LightingCommand) {
        self.lights_active = !cmd.is_all_off();
    }

    /// The peripheral went away; whatever it showed is gone with it.
    pub fn note_detached(&mut self) {
        self.lights_active = false;
    }

    /// Returns the silence in ms when the cutoff trips.  Trips at most
    /// once until lights are active again.
    pub fn check(&mut self, now_ms: u64) -> Option<u64> {
        if !self.lights_active {
            return None;
        }
        let silent = now_ms.saturating_sub(self.last_command_ms);
        if silent < self.cutoff_ms {
            return None;
        }
        warn!("no lighting data for {} ms, forcing all off", silent);
        self.lights_active = false;
        self.trips += 1;
        Some(silent)
    }

    pub fn lights_active(&self) -> bool {
        self.lights_active
    }

    pub fn last_command_ms(&self) -> u64 {
        self.last_command_ms
    }

    /// Number of times the cutoff has tripped.
    pub fn trips(&self) -> u32 {
        self.trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::stagekit::SK_LED_RED;

    fn lit() -> LightingCommand {
        LightingCommand::new(0xFF, SK_LED_RED)
    }

    #[test]
    fn trips_once_after_silence() {
        let mut s = SafetyCutoff::new(5000);
        s.note_command(1000);
        s.note_delivered(lit());
        assert_eq!(s.check(5999), None);
        assert_eq!(s.check(6000), Some(5000));
        assert_eq!(s.check(7000), None);
        assert_eq!(s.check(60_000), None);
        assert_eq!(s.trips(), 1);
    }

    #[test]
    fn fresh_command_resets_window() {
        let mut s = SafetyCutoff::new(5000);
        s.note_command(0);
        s.note_delivered(lit());
        s.note_command(4000);
        assert_eq!(s.check(8000), None);
        assert!(s.check(9000).is_some());
    }

    #[test]
    fn all_off_disarms() {
        let mut s = SafetyCutoff::new(5000);
        s.note_command(0);
        s.note_delivered(lit());
        s.note_command(100);
        s.note_delivered(LightingCommand::ALL_OFF);
        assert_eq!(s.check(100_000), None);
    }

    #[test]
    fn undelivered_commands_never_arm() {
        let mut s = SafetyCutoff::new(5000);
        s.note_command(0);
        assert!(!s.lights_active());
        assert_eq!(s.check(100_000), None);
    }

    #[test]
    fn rearms_after_trip() {
        let mut s = SafetyCutoff::new(1000);
        s.note_command(0);
        s.note_delivered(lit());
        assert!(s.check(1000).is_some());
        s.note_command(2000);
        s.note_delivered(lit());
        assert!(s.check(3000).is_some());
        assert_eq!(s.trips(), 2);
    }
}
