//! Telemetry receive thread: fleet registry upkeep and discovery beacon.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use super::{is_timeout, Shared};
use crate::app::ports::{IntervalDelegate, PeriodicTask};
use crate::config::BridgeConfig;
use crate::discovery::{DiscoveryBeacon, StatusDatagram, MAX_STATUS_DATAGRAM};
use crate::drivers::watchdog::Watchdog;
use crate::scheduler::IntervalTable;

/// Registry aging period.
const SWEEP_INTERVAL_MS: u64 = 1_000;

pub(super) struct Settings {
    broadcast: Ipv4Addr,
    status_port: u16,
    discovery_interval_ms: u64,
    watchdog_ms: u64,
}

impl Settings {
    pub(super) fn from_config(config: &BridgeConfig) -> Self {
        Self {
            broadcast: config.broadcast_addr,
            status_port: config.status_port,
            discovery_interval_ms: config.discovery_interval_ms,
            watchdog_ms: config.watchdog_timeout_ms,
        }
    }
}

/// Runs due rows against the shared registry.
struct Upkeep<'a> {
    shared: &'a Shared,
}

impl IntervalDelegate for Upkeep<'_> {
    fn on_interval(&mut self, task: PeriodicTask, now_ms: u64) {
        if task == PeriodicTask::RegistrySweep {
            let report = self.shared.registry.lock().sweep(now_ms);
            if !report.is_empty() {
                debug!(
                    "telemetry: sweep marked {} offline, purged {}",
                    report.went_stale.len(),
                    report.purged.len()
                );
            }
        }
    }
}

pub(super) fn run(socket: UdpSocket, shared: Arc<Shared>, running: Arc<AtomicBool>, settings: Settings) {
    let mut beacon = DiscoveryBeacon::new(settings.broadcast, settings.status_port, settings.discovery_interval_ms);
    let mut intervals = IntervalTable::new();
    intervals.add(PeriodicTask::RegistrySweep, SWEEP_INTERVAL_MS, shared.clock.now_ms());
    let watchdog = Watchdog::counting_faults(settings.watchdog_ms, Arc::clone(&shared.watchdog_faults));
    let mut buf = [0u8; MAX_STATUS_DATAGRAM];

    while running.load(Ordering::Acquire) {
        watchdog.feed();
        let now = shared.clock.now_ms();

        if let Some((payload, dest)) = beacon.poll(now) {
            match socket.send_to(payload, dest) {
                Ok(_) => trace!("telemetry: discovery beacon to {}", dest),
                Err(e) => debug!("telemetry: beacon send failed: {}", e),
            }
        }
        intervals.tick(now, &mut Upkeep { shared: &shared });

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                warn!("telemetry: receive failed: {}", e);
                continue;
            }
        };

        match StatusDatagram::parse(&buf[..n]) {
            Some(StatusDatagram::Telemetry(report)) => {
                shared.stats.telemetry.fetch_add(1, Ordering::Relaxed);
                let now = shared.clock.now_ms();
                shared.registry.lock().observe(from.ip(), report, now);
            }
            // Our own beacon echoes back on broadcast.
            Some(StatusDatagram::Discovery) => {}
            None => trace!("telemetry: ignored {} byte datagram from {}", n, from),
        }
    }
    debug!("telemetry: exiting");
}
