//! Lifecycle dispatch thread.
//!
//! Delivers events to subscribers one at a time, in the order the
//! listener produced them.  `SongStarted` waits for the configured
//! start delay first; later events queue behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;

use crate::app::events::LifecycleEvent;
use crate::app::ports::LifecycleSubscriber;

const POLL: Duration = Duration::from_millis(100);

pub(super) fn run(
    rx: Receiver<LifecycleEvent>,
    mut subscribers: Vec<Box<dyn LifecycleSubscriber>>,
    start_delay: Duration,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        let event = match rx.recv_timeout(POLL) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if matches!(event, LifecycleEvent::SongStarted(_)) && !start_delay.is_zero() {
            if !sleep_while_running(start_delay, &running) {
                break;
            }
        }

        for sub in subscribers.iter_mut() {
            sub.on_lifecycle(&event);
        }
    }
    debug!("dispatch: exiting");
}

/// Sleep in short slices so `stop()` is never held up by a long delay.
/// Returns `false` if stopped meanwhile.
fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let mut left = total;
    while !left.is_zero() {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let step = left.min(POLL);
        std::thread::sleep(step);
        left -= step;
    }
    running.load(Ordering::Acquire)
}
