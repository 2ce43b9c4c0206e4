//! Protocol receive thread.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info, trace, warn};

use super::{is_timeout, Shared};
use crate::app::events::LifecycleEvent;
use crate::drivers::watchdog::Watchdog;
use crate::protocol::codec::MAX_DATAGRAM;
use crate::protocol::{decode, EventType, LightingCommand};

pub(super) fn run(
    socket: UdpSocket,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    tx: Sender<LifecycleEvent>,
    watchdog_ms: u64,
) {
    let watchdog = Watchdog::counting_faults(watchdog_ms, Arc::clone(&shared.watchdog_faults));
    let mut buf = [0u8; MAX_DATAGRAM];

    while running.load(Ordering::Acquire) {
        watchdog.feed();

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                warn!("listener: receive failed: {}", e);
                continue;
            }
        };
        if !running.load(Ordering::Acquire) {
            break;
        }

        let now = shared.clock.now_ms();
        shared.stats.received.fetch_add(1, Ordering::Relaxed);

        let Some(packet) = decode(&buf[..n]) else {
            shared.stats.invalid.fetch_add(1, Ordering::Relaxed);
            trace!("listener: dropped {} byte datagram from {}", n, from);
            continue;
        };

        {
            let mut link = shared.game_link.lock();
            if link.address != Some(from.ip()) {
                info!("listener: game console at {}", from.ip());
            }
            link.address = Some(from.ip());
            link.last_packet_ms = Some(now);
        }

        match packet.event_type() {
            Some(EventType::StageKit) => {
                if let Some(cmd) = LightingCommand::from_payload(packet.payload) {
                    shared.stats.lighting.fetch_add(1, Ordering::Relaxed);
                    shared.lighting.publish(cmd);
                }
            }
            Some(EventType::Alive) => {
                let build = {
                    let mut tracker = shared.tracker.lock();
                    tracker.apply_packet(&packet, now);
                    tracker.game_build().map(str::to_owned)
                };
                let mut link = shared.game_link.lock();
                if build.is_some() && link.build != build {
                    info!("listener: RB3E alive, build {:?}", build);
                }
                link.build = build;
            }
            Some(_) => {
                let event = shared.tracker.lock().apply_packet(&packet, now);
                if let Some(event) = event {
                    shared.stats.lifecycle.fetch_add(1, Ordering::Relaxed);
                    if tx.send(event).is_err() {
                        debug!("listener: dispatcher gone");
                    }
                }
            }
            None => trace!("listener: unknown event code {}", packet.event_code),
        }
    }
    debug!("listener: exiting");
}
