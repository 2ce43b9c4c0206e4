//! Watchdog driver.
//!
//! On ESP-IDF this wraps the Task Watchdog Timer (TWDT): the chip resets
//! if the main loop stalls past the timeout.  On the host a monitor
//! thread plays the same role, so a wedged controller process still
//! restarts (under its service manager) instead of leaving the rig lit.
//!
//! The main loop must call `feed()` on every tick, including while the
//! link is down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::app::ports::WatchdogPort;
use crate::error::LivenessFault;

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(feature = "espidf"))]
use std::sync::atomic::AtomicBool;
#[cfg(not(feature = "espidf"))]
use std::thread::JoinHandle;
#[cfg(not(feature = "espidf"))]
use std::time::{Duration, Instant};

use log::info;

// ── Liveness monitor (platform independent) ──────────────────

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Starved(LivenessFault),
}

/// Tracks the last feed and reports starvation.  Shareable between the
/// feeding loop and a checking thread.
#[derive(Debug)]
pub struct LivenessMonitor {
    timeout_ms: u64,
    last_feed_ms: AtomicU64,
}

impl LivenessMonitor {
    pub fn new(timeout_ms: u64, now_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_feed_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn feed(&self, now_ms: u64) {
        self.last_feed_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    pub fn check(&self, now_ms: u64) -> Liveness {
        let last = self.last_feed_ms.load(Ordering::Acquire);
        let starved_ms = now_ms.saturating_sub(last);
        if starved_ms > self.timeout_ms {
            Liveness::Starved(LivenessFault {
                starved_ms,
                timeout_ms: self.timeout_ms,
            })
        } else {
            Liveness::Alive
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

/// What the host monitor does on starvation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarvationAction {
    /// Abort the process (controller role).
    Restart,
    /// Log the fault and keep running (aggregator role).
    LogFault,
}

// ── Watchdog ─────────────────────────────────────────────────

pub struct Watchdog {
    #[cfg(feature = "espidf")]
    subscribed: bool,
    #[cfg(not(feature = "espidf"))]
    host: HostMonitor,
}

impl Watchdog {
    /// Initialise and subscribe the current task to the watchdog.
    pub fn new(timeout_ms: u64, action: StarvationAction) -> Self {
        Self::build(timeout_ms, action, None)
    }

    /// [`StarvationAction::LogFault`] watchdog that also counts each
    /// reported starvation into `faults`.
    pub fn counting_faults(timeout_ms: u64, faults: Arc<AtomicU64>) -> Self {
        Self::build(timeout_ms, StarvationAction::LogFault, Some(faults))
    }

    fn build(timeout_ms: u64, action: StarvationAction, faults: Option<Arc<AtomicU64>>) -> Self {
        #[cfg(feature = "espidf")]
        {
            // The TWDT always panics (and resets) on trigger.
            let _ = (action, faults);
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: timeout_ms as u32,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!("TWDT reconfigure returned {} (may already be configured)", ret);
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self { subscribed }
            }
        }

        #[cfg(not(feature = "espidf"))]
        {
            info!("Watchdog(host): {} ms timeout, {:?} on starvation", timeout_ms, action);
            Self {
                host: HostMonitor::spawn(timeout_ms, action, faults),
            }
        }
    }

    /// Feed the watchdog.
    pub fn feed(&self) {
        #[cfg(feature = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(feature = "espidf"))]
        self.host.feed();
    }
}

impl WatchdogPort for Watchdog {
    fn feed(&self) {
        Watchdog::feed(self);
    }
}

// ── Host monitor thread ──────────────────────────────────────

#[cfg(not(feature = "espidf"))]
struct HostMonitor {
    epoch: Instant,
    monitor: Arc<LivenessMonitor>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[cfg(not(feature = "espidf"))]
impl HostMonitor {
    fn spawn(timeout_ms: u64, action: StarvationAction, faults: Option<Arc<AtomicU64>>) -> Self {
        let epoch = Instant::now();
        let monitor = Arc::new(LivenessMonitor::new(timeout_ms, 0));
        let running = Arc::new(AtomicBool::new(true));

        let thread_monitor = Arc::clone(&monitor);
        let thread_running = Arc::clone(&running);
        let poll = Duration::from_millis((timeout_ms / 4).max(10));

        let handle = std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                let mut reported = false;
                while thread_running.load(Ordering::Acquire) {
                    std::thread::sleep(poll);
                    let now_ms = epoch.elapsed().as_millis() as u64;
                    match thread_monitor.check(now_ms) {
                        Liveness::Alive => reported = false,
                        Liveness::Starved(fault) => match action {
                            StarvationAction::Restart => {
                                log::error!("Watchdog: {}; restarting", fault);
                                std::process::abort();
                            }
                            StarvationAction::LogFault if !reported => {
                                log::error!("Watchdog: {}", fault);
                                if let Some(faults) = &faults {
                                    faults.fetch_add(1, Ordering::Relaxed);
                                }
                                reported = true;
                            }
                            StarvationAction::LogFault => {}
                        },
                    }
                }
            })
            .map_err(|e| log::warn!("Watchdog: monitor thread not started ({})", e))
            .ok();

        Self {
            epoch,
            monitor,
            running,
            handle,
        }
    }

    fn feed(&self) {
        self.monitor.feed(self.epoch.elapsed().as_millis() as u64);
    }
}

#[cfg(not(feature = "espidf"))]
impl Drop for HostMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
