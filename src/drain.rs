//! Command drain queue.
//!
//! Lighting cues are state, not history: only the newest one matters.
//! Every tick the supervisor drains everything the socket has buffered
//! and keeps the last lighting command, so the peripheral never lags
//! behind a burst.
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ socket   │──▶│ decode+classify│──▶│ keep newest only │──▶│ peripheral │
//! │ backlog  │   │ (Polled)       │   │ (depth ≤ 1)      │   │            │
//! └──────────┘   └───────────────┘   └──────────────────┘   └────────────┘
//! ```
//!
//! [`CommandSlot`] is the cross-thread variant: a single atomic word
//! that producers overwrite and the consumer swaps out.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use log::trace;

use crate::app::ports::Recv;
use crate::protocol::LightingCommand;

/// Classification of one received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled {
    /// A well-formed `StageKit` packet.
    Lighting(LightingCommand),
    /// A well-formed packet of any other type (already handed to the tracker).
    Other,
    /// Failed to decode.
    Invalid,
}

/// Poll `receive` until it reports [`Recv::Empty`], returning only the
/// last command seen.  Unbounded; prefer [`CommandDrain`] in a loop that
/// must keep feeding a watchdog.
pub fn drain<F>(mut receive: F) -> Option<LightingCommand>
where
    F: FnMut() -> Recv<Option<LightingCommand>>,
{
    let mut latest = None;
    while let Recv::Ready(polled) = receive() {
        if polled.is_some() {
            latest = polled;
        }
    }
    latest
}

/// Receive counters, reported by the heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub received: u64,
    pub lighting: u64,
    /// Valid packets the drain does not act on.
    pub ignored: u64,
    pub invalid: u64,
    /// Lighting commands superseded by a newer one in the same pass.
    pub superseded: u64,
}

/// Result of one bounded drain pass.
#[derive(Debug)]
pub struct DrainPass<E> {
    pub latest: Option<LightingCommand>,
    pub consumed: usize,
    /// The per-pass cap was hit with data possibly still buffered.
    pub capped: bool,
    /// Receive failed; the pass stopped early.
    pub fault: Option<E>,
}

/// Bounded, counting drain.
#[derive(Debug)]
pub struct CommandDrain {
    max_per_pass: usize,
    stats: DrainStats,
}

impl CommandDrain {
    pub fn new(max_per_pass: usize) -> Self {
        Self {
            max_per_pass: max_per_pass.max(1),
            stats: DrainStats::default(),
        }
    }

    /// Drain up to `max_per_pass` datagrams.
    pub fn drain<E, F>(&mut self, mut receive: F) -> DrainPass<E>
    where
        F: FnMut() -> Result<Recv<Polled>, E>,
    {
        let mut pass = DrainPass {
            latest: None,
            consumed: 0,
            capped: false,
            fault: None,
        };

        while pass.consumed < self.max_per_pass {
            let polled = match receive() {
                Ok(Recv::Ready(p)) => p,
                Ok(Recv::Empty) => return pass,
                Err(e) => {
                    pass.fault = Some(e);
                    return pass;
                }
            };
            pass.consumed += 1;
            self.stats.received += 1;

            match polled {
                Polled::Lighting(cmd) => {
                    self.stats.lighting += 1;
                    if pass.latest.replace(cmd).is_some() {
                        self.stats.superseded += 1;
                    }
                }
                Polled::Other => self.stats.ignored += 1,
                Polled::Invalid => {
                    self.stats.invalid += 1;
                    trace!("dropped malformed datagram");
                }
            }
        }

        pass.capped = true;
        pass
    }

    pub fn stats(&self) -> DrainStats {
        self.stats
    }
}

// ── Cross-thread latest-wins mailbox ──────────────────────────

const PENDING: u32 = 1 << 16;

/// Single-slot, lock-free mailbox holding the newest lighting command.
///
/// `publish` overwrites; `take` empties.  Any number of producers, one
/// consumer.
#[derive(Debug, Default)]
pub struct CommandSlot {
    word: AtomicU32,
    overwritten: AtomicU64,
}

impl CommandSlot {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, cmd: LightingCommand) {
        let packed = PENDING | (u32::from(cmd.left_weight) << 8) | u32::from(cmd.right_weight);
        let prev = self.word.swap(packed, Ordering::AcqRel);
        if prev & PENDING != 0 {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn take(&self) -> Option<LightingCommand> {
        let word = self.word.swap(0, Ordering::AcqRel);
        if word & PENDING == 0 {
            return None;
        }
        Some(LightingCommand::new((word >> 8) as u8, word as u8))
    }

    /// Commands replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
