//! Interval table for the cooperative loop.
//!
//! Every periodic activity is one explicit row `(task, interval, last_fired)`
//! evaluated once per tick.  The table notifies an [`IntervalDelegate`]
//! when a row comes due; the supervisor implements the delegate.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     IntervalTable                        │
//! │                                                          │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────┐ │
//! │  │ Heartbeat  │ │ Telemetry  │ │ Periph.    │ │ Link   │ │
//! │  │ 2 s        │ │ 5 s        │ │ retry 5 s  │ │ retry  │ │
//! │  └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ └───┬────┘ │
//! │        └──────────────┴──────┬───────┴────────────┘      │
//! │                              ▼                           │
//! │                     IntervalDelegate                     │
//! │                  (Supervisor side effects)               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are driven by monotonic milliseconds rather than tick counts, so
//! variable loop pacing does not skew the intervals.

use log::info;

use crate::app::ports::{IntervalDelegate, PeriodicTask};

/// Maximum number of rows (stack-allocated).
const MAX_INTERVALS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct IntervalEntry {
    task: PeriodicTask,
    interval_ms: u64,
    last_fired_ms: u64,
    /// Fire on the next tick regardless of the interval.
    forced: bool,
}

/// Fixed-capacity table of periodic tasks.
#[derive(Debug)]
pub struct IntervalTable {
    entries: heapless::Vec<IntervalEntry, MAX_INTERVALS>,
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalTable {
    pub fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    /// Add a row whose first firing is one interval after `now_ms`.
    /// Returns `false` if the table is full or the task is already present.
    pub fn add(&mut self, task: PeriodicTask, interval_ms: u64, now_ms: u64) -> bool {
        if self.entries.iter().any(|e| e.task == task) {
            return false;
        }
        let pushed = self
            .entries
            .push(IntervalEntry {
                task,
                interval_ms,
                last_fired_ms: now_ms,
                forced: false,
            })
            .is_ok();
        if pushed {
            info!("IntervalTable: {:?} every {} ms", task, interval_ms);
        }
        pushed
    }

    /// Make `task` due on the next tick.
    pub fn trigger_now(&mut self, task: PeriodicTask) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.task == task) {
            e.forced = true;
        }
    }

    /// Evaluate every row once.  Due rows fire at most once per tick,
    /// even if several intervals elapsed.
    pub fn tick(&mut self, now_ms: u64, delegate: &mut dyn IntervalDelegate) {
        for entry in self.entries.iter_mut() {
            if entry.forced || now_ms.saturating_sub(entry.last_fired_ms) >= entry.interval_ms {
                entry.last_fired_ms = now_ms;
                entry.forced = false;
                delegate.on_interval(entry.task, now_ms);
            }
        }
    }
}
