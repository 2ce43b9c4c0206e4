//! Loop pacing and memory reclamation policy.

use core::time::Duration;

/// Adaptive loop delay: short while packets flow, longer when idle.
#[derive(Debug, Clone, Copy)]
pub struct LoopPacing {
    active: Duration,
    idle: Duration,
}

impl LoopPacing {
    pub fn new(active_us: u64, idle_us: u64) -> Self {
        Self {
            active: Duration::from_micros(active_us),
            idle: Duration::from_micros(idle_us),
        }
    }

    /// Delay before the next tick.
    pub fn delay(&self, packet_this_tick: bool) -> Duration {
        if packet_this_tick {
            self.active
        } else {
            self.idle
        }
    }
}

/// Why a reclamation pass ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimReason {
    /// Free heap fell below the threshold.
    Pressure,
    /// No lighting traffic for the idle period (between songs).
    Idle,
}

/// Decides when to run a memory reclamation pass.
///
/// Reclamation can stall the loop for milliseconds, so it never runs
/// while lights are active.  Under pressure it runs every tick until
/// free memory recovers; the idle path runs at most once per idle period.
#[derive(Debug)]
pub struct ReclaimPolicy {
    idle_period_ms: u64,
    free_threshold: usize,
    last_reclaim_ms: u64,
}

impl ReclaimPolicy {
    pub fn new(idle_period_ms: u64, free_threshold: usize) -> Self {
        Self {
            idle_period_ms,
            free_threshold,
            last_reclaim_ms: 0,
        }
    }

    pub fn evaluate(
        &mut self,
        now_ms: u64,
        free_bytes: Option<usize>,
        last_packet_ms: u64,
        lights_active: bool,
    ) -> Option<ReclaimReason> {
        if lights_active {
            return None;
        }

        let reason = if free_bytes.is_some_and(|free| free < self.free_threshold) {
            ReclaimReason::Pressure
        } else if now_ms.saturating_sub(last_packet_ms) >= self.idle_period_ms
            && now_ms.saturating_sub(self.last_reclaim_ms) >= self.idle_period_ms
        {
            ReclaimReason::Idle
        } else {
            return None;
        };

        self.last_reclaim_ms = now_ms;
        Some(reason)
    }
}
