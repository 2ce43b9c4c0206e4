//! Aggregator role: the desktop side of the bridge.
//!
//! ```text
//!            ┌──────────────────┐   LifecycleEvent   ┌───────────────┐
//!  :21070 ──▶│ listener thread  │───(crossbeam)─────▶│ dispatch      │──▶ subscribers
//!            │ tracker · slot   │                    │ thread        │
//!            └──────────────────┘                    └───────────────┘
//!            ┌──────────────────┐
//!  :21071 ◀─▶│ telemetry thread │  registry · beacon
//!            └──────────────────┘
//! ```
//!
//! Shared aggregates (tracker, registry, game link) each sit behind their
//! own `parking_lot::Mutex`.  Locks are held only to copy or update a
//! record, never across a send or a subscriber callback.
//!
//! Cancellation is cooperative: `stop()` clears the running flag, wakes
//! blocked receivers with an empty datagram, and joins the threads.

pub mod control;
mod dispatch;
mod listener;
mod telemetry;

pub use control::StageKitControl;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::bounded;
use log::{info, warn};
use parking_lot::Mutex;

use crate::adapters::time::MonotonicClock;
use crate::app::events::LifecycleEvent;
use crate::app::ports::{LifecycleSubscriber, TransportError};
use crate::config::BridgeConfig;
use crate::drain::CommandSlot;
use crate::error::{Error, Result};
use crate::game::{GameState, GameStateTracker};
use crate::protocol::LightingCommand;
use crate::registry::{DeviceRecord, DeviceRegistry};

/// Lifecycle events buffered between listener and dispatcher.
const DISPATCH_QUEUE: usize = 256;

/// Last known game console.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameLink {
    /// Sender of the most recent RB3E datagram.
    pub address: Option<IpAddr>,
    pub last_packet_ms: Option<u64>,
    /// Build string from the latest `Alive`.
    pub build: Option<String>,
}

impl GameLink {
    /// Whether a packet arrived within `window_ms`.
    pub fn is_active(&self, now_ms: u64, window_ms: u64) -> bool {
        self.last_packet_ms
            .is_some_and(|t| now_ms.saturating_sub(t) <= window_ms)
    }
}

/// Receive counters for the protocol listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub received: AtomicU64,
    pub invalid: AtomicU64,
    pub lighting: AtomicU64,
    pub lifecycle: AtomicU64,
    pub telemetry: AtomicU64,
}

/// Snapshot of [`ListenerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub invalid: u64,
    pub lighting: u64,
    pub lifecycle: u64,
    pub telemetry: u64,
    /// Lighting cues replaced before `take_lighting` saw them.
    pub superseded: u64,
    /// Starvations reported by the receive threads' watchdogs.
    pub watchdog_faults: u64,
}

/// State shared by the aggregator threads.
pub(crate) struct Shared {
    pub tracker: Mutex<GameStateTracker>,
    pub registry: Mutex<DeviceRegistry>,
    pub game_link: Mutex<GameLink>,
    pub lighting: CommandSlot,
    pub stats: ListenerStats,
    pub watchdog_faults: Arc<AtomicU64>,
    pub clock: MonotonicClock,
}

pub struct Aggregator {
    config: BridgeConfig,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    subscribers: Vec<Box<dyn LifecycleSubscriber>>,
    /// Bound (event, status) addresses while running.
    bound: Option<(SocketAddr, SocketAddr)>,
}

impl Aggregator {
    pub fn new(config: BridgeConfig) -> Self {
        let registry = DeviceRegistry::new(config.device_stale_ms, config.device_purge_ms);
        Self {
            shared: Arc::new(Shared {
                tracker: Mutex::new(GameStateTracker::new()),
                registry: Mutex::new(registry),
                game_link: Mutex::new(GameLink::default()),
                lighting: CommandSlot::new(),
                stats: ListenerStats::default(),
                watchdog_faults: Arc::new(AtomicU64::new(0)),
                clock: MonotonicClock::new(),
            }),
            config,
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            subscribers: Vec::new(),
            bound: None,
        }
    }

    /// Register a lifecycle subscriber.  Takes effect at the next `start()`.
    pub fn subscribe(&mut self, subscriber: impl LifecycleSubscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Bind both ports and spawn the worker threads.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let timeout = Duration::from_millis(self.config.receive_timeout_ms);
        let event_socket = bind_blocking(SocketAddr::new(self.config.bind_addr, self.config.event_port), timeout)?;
        let status_socket =
            bind_blocking(SocketAddr::new(self.config.bind_addr, self.config.status_port), timeout)?;
        let event_addr = event_socket.local_addr().map_err(TransportError::Bind)?;
        let status_addr = status_socket.local_addr().map_err(TransportError::Bind)?;

        self.running.store(true, Ordering::SeqCst);
        let (tx, rx) = bounded::<LifecycleEvent>(DISPATCH_QUEUE);

        let listener = {
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&self.running);
            let watchdog_ms = self.config.watchdog_timeout_ms;
            spawn("rb3e-listener", move || listener::run(event_socket, shared, running, tx, watchdog_ms))?
        };
        self.threads.push(listener);

        let telemetry = {
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&self.running);
            let settings = telemetry::Settings::from_config(&self.config);
            spawn("rb3e-telemetry", move || telemetry::run(status_socket, shared, running, settings))?
        };
        self.threads.push(telemetry);

        let dispatcher = {
            let running = Arc::clone(&self.running);
            let subscribers = std::mem::take(&mut self.subscribers);
            let delay = Duration::from_millis(self.config.song_start_delay_ms);
            spawn("rb3e-dispatch", move || dispatch::run(rx, subscribers, delay, running))?
        };
        self.threads.push(dispatcher);

        self.bound = Some((event_addr, status_addr));
        info!("Aggregator: listening on {} (events) and {} (status)", event_addr, status_addr);
        Ok(())
    }

    /// Stop and join every thread.  Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) && self.threads.is_empty() {
            return;
        }

        if let Some((event_addr, status_addr)) = self.bound.take() {
            wake(event_addr);
            wake(status_addr);
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Aggregator: worker thread panicked");
            }
        }
        info!("Aggregator: stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound (event, status) addresses while running.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.bound
    }

    // ── Snapshots ─────────────────────────────────────────────

    pub fn game_state(&self) -> GameState {
        self.shared.tracker.lock().state()
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.shared.registry.lock().snapshot()
    }

    pub fn device_address(&self, id: &str) -> Option<IpAddr> {
        self.shared.registry.lock().address_of(id)
    }

    pub fn game_link(&self) -> GameLink {
        self.shared.game_link.lock().clone()
    }

    /// Whether the game has sent anything within the activity window.
    pub fn is_game_active(&self) -> bool {
        let now = self.shared.clock.now_ms();
        self.shared
            .game_link
            .lock()
            .is_active(now, self.config.game_activity_window_ms)
    }

    /// Newest lighting cue seen from the game since the last call.
    pub fn take_lighting(&self) -> Option<LightingCommand> {
        self.shared.lighting.take()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.shared.stats;
        StatsSnapshot {
            received: s.received.load(Ordering::Relaxed),
            invalid: s.invalid.load(Ordering::Relaxed),
            lighting: s.lighting.load(Ordering::Relaxed),
            lifecycle: s.lifecycle.load(Ordering::Relaxed),
            telemetry: s.telemetry.load(Ordering::Relaxed),
            superseded: self.shared.lighting.overwritten(),
            watchdog_faults: self.shared.watchdog_faults.load(Ordering::Relaxed),
        }
    }

    /// Sender for manual Stage Kit commands.
    pub fn control(&self) -> Result<StageKitControl> {
        StageKitControl::new(self.config.event_port, self.config.broadcast_addr).map_err(Error::from)
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_blocking(addr: SocketAddr, timeout: Duration) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).map_err(TransportError::Bind)?;
    socket.set_read_timeout(Some(timeout)).map_err(TransportError::Bind)?;
    socket.set_broadcast(true).map_err(TransportError::Bind)?;
    Ok(socket)
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| Error::Transport(TransportError::Bind(e)))
}

/// Unblock a receiver bound to `addr` with an empty datagram.
fn wake(addr: SocketAddr) {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port()),
        _ => addr,
    };
    if let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) {
        let _ = socket.send_to(&[], target);
    }
}

/// True for the errors a timed-out blocking receive reports.
pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}
