//! Recovery supervisor: the controller's cooperative loop body.
//!
//! [`Supervisor`] owns the tracker, drain queue, safety cutoff, interval
//! table and peer cache.  All I/O flows through the port traits bundled
//! in [`BridgeIo`], so the whole loop runs against mocks in tests.
//!
//! ```text
//!   LinkPort ──▶ ┌──────────────────────────────┐ ──▶ StageKitPort
//!    NetPort ──▶ │          Supervisor          │ ──▶ EventSink
//!                │ tracker · drain · safety ·   │ ──▶ NetPort (telemetry)
//! WatchdogPort ◀─│ intervals · peer cache       │
//!                └──────────────────────────────┘
//! ```
//!
//! ## Link state machine
//!
//! ```text
//!  Disconnected ──▶ Connecting ──connect+bind ok, Stage Kit present──▶ Attached
//!                     ▲    │                                             │   ▲
//!                     │    └──connect+bind ok, no Stage Kit──▶ Degraded ◀┘   │
//!                     │                          (peripheral detached) │     │
//!                     │                                                └─────┘
//!                     └───────────── link lost (any state)     (re-attached)
//! ```
//!
//! Any state re-enters `Connecting` on link loss.  Reconnection, including
//! a rebind after a link that returned on its own, only happens when the
//! `LinkRetry` row comes due.  There is no terminal state.

use core::time::Duration;

use log::{debug, info, trace, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{
    EventSink, IntervalDelegate, LinkPort, MemoryPort, NetPort, PeriodicTask, Recv, StageKitPort,
    TransportError, WatchdogPort,
};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::discovery::{DeviceIdentity, PeerAddressCache, StatusDatagram, TelemetryReport, MAX_STATUS_DATAGRAM};
use crate::drain::{CommandDrain, DrainStats, Polled};
use crate::game::GameStateTracker;
use crate::idle::{LoopPacing, ReclaimPolicy};
use crate::protocol::codec::MAX_DATAGRAM;
use crate::protocol::{decode, EventType, LightingCommand};
use crate::safety::SafetyCutoff;
use crate::scheduler::IntervalTable;

/// Status datagrams handled per tick.
const MAX_STATUS_PER_TICK: usize = 8;

/// Supervisor link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Initial state; nothing attempted yet.
    Disconnected,
    /// Link down; retrying on the backoff interval.
    Connecting,
    /// Link up, sockets bound, peripheral attached.
    Attached,
    /// Link up, peripheral missing.
    Degraded,
}

impl LinkState {
    pub fn link_up(self) -> bool {
        matches!(self, Self::Attached | Self::Degraded)
    }
}

/// Every port the supervisor drives.
pub struct BridgeIo<L, N, K, W, M, S> {
    pub link: L,
    pub net: N,
    pub stagekit: K,
    pub watchdog: W,
    pub memory: M,
    pub sink: S,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub state: LinkState,
    /// Sleep before the next tick.
    pub delay: Duration,
    /// Command delivered to the peripheral this tick.
    pub applied: Option<LightingCommand>,
    /// The safety cutoff fired this tick.
    pub forced_off: bool,
    /// Datagrams consumed from the event socket.
    pub received: usize,
}

/// Collects due tasks so they can run after the table borrow ends.
#[derive(Default)]
struct DueTasks(heapless::Vec<PeriodicTask, 8>);

impl IntervalDelegate for DueTasks {
    fn on_interval(&mut self, task: PeriodicTask, _now_ms: u64) {
        let _ = self.0.push(task);
    }
}

pub struct Supervisor {
    state: LinkState,
    tracker: GameStateTracker,
    drain: CommandDrain,
    safety: SafetyCutoff,
    pacing: LoopPacing,
    reclaim: ReclaimPolicy,
    intervals: IntervalTable,
    peer: PeerAddressCache,
    identity: DeviceIdentity,
    status_port: u16,
    broadcast: std::net::Ipv4Addr,
    boot_ms: u64,
    last_packet_ms: u64,
    ticks: u64,
    /// Sockets are bound and have not failed since.
    bound: bool,
    /// Link status seen by the previous tick.
    link_was_up: bool,
}

impl Supervisor {
    pub fn new(config: &BridgeConfig, identity: DeviceIdentity, now_ms: u64) -> Self {
        let mut intervals = IntervalTable::new();
        intervals.add(PeriodicTask::Heartbeat, config.heartbeat_interval_ms, now_ms);
        intervals.add(PeriodicTask::Telemetry, config.telemetry_interval_ms, now_ms);
        intervals.add(PeriodicTask::PeripheralRetry, config.peripheral_retry_ms, now_ms);
        intervals.add(PeriodicTask::LinkRetry, config.reconnect_backoff_ms, now_ms);

        Self {
            state: LinkState::Disconnected,
            tracker: GameStateTracker::new(),
            drain: CommandDrain::new(config.max_drain_per_tick),
            safety: SafetyCutoff::new(config.safety_cutoff_ms),
            pacing: LoopPacing::new(config.loop_delay_active_us, config.loop_delay_idle_us),
            reclaim: ReclaimPolicy::new(config.idle_reclaim_ms, config.reclaim_free_threshold_bytes),
            intervals,
            peer: PeerAddressCache::new(),
            identity,
            status_port: config.status_port,
            broadcast: config.broadcast_addr,
            boot_ms: now_ms,
            last_packet_ms: now_ms,
            ticks: 0,
            bound: false,
            link_was_up: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bind the event and status sockets, announce startup and make the
    /// first link / peripheral attempts happen on the next tick.
    ///
    /// A port that cannot be bound here is a startup fault; later rebinds
    /// after a link loss are retried on the backoff instead.
    pub fn start<L, N, K, W, M, S>(&mut self, io: &mut BridgeIo<L, N, K, W, M, S>) -> Result<()>
    where
        N: NetPort,
        S: EventSink,
    {
        io.net.reopen()?;
        self.bound = true;

        info!("Supervisor started as {} ({})", self.identity.name, self.identity.id);
        io.sink.emit(&AppEvent::Started);
        self.intervals.trigger_now(PeriodicTask::LinkRetry);
        self.intervals.trigger_now(PeriodicTask::PeripheralRetry);
        Ok(())
    }

    /// Turn the rig off on the way out.
    pub fn shutdown<L, N, K, W, M, S>(&mut self, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        K: StageKitPort,
    {
        let s = self.drain.stats();
        info!(
            "Supervisor stopping: rx={} lighting={} ignored={} invalid={}",
            s.received, s.lighting, s.ignored, s.invalid
        );
        if io.stagekit.is_attached() {
            if let Err(e) = io.stagekit.send(LightingCommand::ALL_OFF) {
                warn!("final all-off failed: {}", e);
            }
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one loop iteration.  Never blocks; the caller sleeps for
    /// `TickOutcome::delay` afterwards.
    pub fn tick<L, N, K, W, M, S>(&mut self, now_ms: u64, io: &mut BridgeIo<L, N, K, W, M, S>) -> TickOutcome
    where
        L: LinkPort,
        N: NetPort,
        K: StageKitPort,
        W: WatchdogPort,
        M: MemoryPort,
        S: EventSink,
    {
        self.ticks += 1;

        // 1. Liveness first, every tick, whatever the link is doing.
        io.watchdog.feed();

        // 2. Link supervision
        io.link.poll();
        let connected = io.link.is_connected();
        if !connected && self.state != LinkState::Connecting {
            warn!("link down, reconnecting");
            // Sockets bound on a link that has since dropped are stale.
            if self.state.link_up() {
                self.bound = false;
            }
            self.set_state(LinkState::Connecting, &mut io.sink);
            self.intervals.trigger_now(PeriodicTask::LinkRetry);
        } else if connected && !self.link_was_up && self.state == LinkState::Connecting {
            // Came back on its own: rebind on this tick's retry.
            self.intervals.trigger_now(PeriodicTask::LinkRetry);
        }
        self.link_was_up = connected;

        // 3. Periodic tasks
        let mut due = DueTasks::default();
        self.intervals.tick(now_ms, &mut due);
        for task in due.0 {
            self.run_task(task, now_ms, io);
        }

        // 4. Protocol traffic
        let mut outcome = TickOutcome {
            state: self.state,
            delay: Duration::ZERO,
            applied: None,
            forced_off: false,
            received: 0,
        };

        if self.state.link_up() {
            let latest = self.drain_events(now_ms, io, &mut outcome);
            self.poll_status(io);

            if let Some(cmd) = latest {
                self.safety.note_command(now_ms);
                self.last_packet_ms = now_ms;
                outcome.applied = self.deliver(cmd, io);
            }
        }

        // 5. Peripheral presence drives Attached ⇄ Degraded.
        self.track_peripheral(io);

        // 6. Safety cutoff runs regardless of link state.
        if let Some(silent_ms) = self.safety.check(now_ms) {
            outcome.forced_off = true;
            if io.stagekit.is_attached() {
                if let Err(e) = io.stagekit.send(LightingCommand::ALL_OFF) {
                    warn!("safety all-off failed: {}", e);
                }
            }
            io.sink.emit(&AppEvent::SafetyCutoff { silent_ms });
        }

        // 7. Memory reclamation, never while lit.
        if let Some(reason) = self.reclaim.evaluate(
            now_ms,
            io.memory.free_bytes(),
            self.last_packet_ms,
            self.safety.lights_active(),
        ) {
            debug!("reclaiming memory ({:?})", reason);
            io.memory.reclaim();
        }

        outcome.state = self.state;
        outcome.delay = self.pacing.delay(outcome.received > 0);
        outcome
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn tracker(&self) -> &GameStateTracker {
        &self.tracker
    }

    pub fn stats(&self) -> DrainStats {
        self.drain.stats()
    }

    pub fn peer(&self) -> &PeerAddressCache {
        &self.peer
    }

    pub fn lights_active(&self) -> bool {
        self.safety.lights_active()
    }

    pub fn safety_trips(&self) -> u32 {
        self.safety.trips()
    }

    // ── Internal ──────────────────────────────────────────────

    fn set_state<S: EventSink>(&mut self, to: LinkState, sink: &mut S) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("link state {:?} -> {:?}", from, to);
        self.state = to;
        sink.emit(&AppEvent::StateChanged { from, to });
    }

    fn run_task<L, N, K, W, M, S>(&mut self, task: PeriodicTask, now_ms: u64, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        L: LinkPort,
        N: NetPort,
        K: StageKitPort,
        S: EventSink,
    {
        match task {
            PeriodicTask::LinkRetry => {
                if self.state.link_up() {
                    return;
                }
                if self.state == LinkState::Disconnected {
                    self.set_state(LinkState::Connecting, &mut io.sink);
                }
                if !io.link.is_connected() {
                    if let Err(e) = io.link.connect() {
                        warn!("link connect failed: {}", e);
                        return;
                    }
                }
                self.bring_up(io);
            }
            PeriodicTask::PeripheralRetry => {
                if io.stagekit.is_attached() {
                    return;
                }
                debug!("attempting Stage Kit attach");
                match io.stagekit.try_attach() {
                    Ok(()) => {
                        info!("Stage Kit attached");
                        io.sink.emit(&AppEvent::PeripheralAttached);
                    }
                    Err(e) => debug!("Stage Kit attach: {}", e),
                }
            }
            PeriodicTask::Heartbeat => {
                let s = self.drain.stats();
                debug!(
                    "heartbeat: state={:?} rx={} lighting={} ignored={} invalid={} superseded={}",
                    self.state, s.received, s.lighting, s.ignored, s.invalid, s.superseded
                );
            }
            PeriodicTask::Telemetry => {
                if self.state.link_up() {
                    self.send_telemetry(now_ms, io);
                }
            }
            PeriodicTask::RegistrySweep => {}
        }
    }

    /// Link is up: rebind sockets if they were lost and resume processing.
    fn bring_up<L, N, K, W, M, S>(&mut self, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        L: LinkPort,
        N: NetPort,
        K: StageKitPort,
        S: EventSink,
    {
        if !self.bound {
            if let Err(e) = io.net.reopen() {
                warn!("socket bind failed: {}", e);
                return;
            }
            self.bound = true;
        }
        if let Some(ip) = io.link.local_addr() {
            info!("link up at {}", ip);
        }
        let next = if io.stagekit.is_attached() {
            LinkState::Attached
        } else {
            LinkState::Degraded
        };
        self.set_state(next, &mut io.sink);
        // Announce ourselves straight away.
        self.intervals.trigger_now(PeriodicTask::Telemetry);
    }

    fn drain_events<L, N, K, W, M, S>(
        &mut self,
        now_ms: u64,
        io: &mut BridgeIo<L, N, K, W, M, S>,
        outcome: &mut TickOutcome,
    ) -> Option<LightingCommand>
    where
        N: NetPort,
        S: EventSink,
    {
        let tracker = &mut self.tracker;
        let net = &mut io.net;
        let sink = &mut io.sink;
        let mut buf = [0u8; MAX_DATAGRAM];

        let pass = self.drain.drain(|| -> core::result::Result<Recv<Polled>, TransportError> {
            let n = match net.recv_event(&mut buf)? {
                Recv::Ready(n) => n,
                Recv::Empty => return Ok(Recv::Empty),
            };
            Ok(Recv::Ready(classify(&buf[..n], now_ms, tracker, sink)))
        });
        outcome.received = pass.consumed;

        if let Some(e) = pass.fault {
            warn!("event socket error: {}", e);
            if let Err(e) = io.net.reopen() {
                warn!("socket reopen failed: {}", e);
                self.bound = false;
                self.set_state(LinkState::Connecting, &mut io.sink);
            }
        }
        pass.latest
    }

    fn poll_status<L, N, K, W, M, S>(&mut self, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        N: NetPort,
        S: EventSink,
    {
        let mut buf = [0u8; MAX_STATUS_DATAGRAM];
        for _ in 0..MAX_STATUS_PER_TICK {
            let (n, from) = match io.net.recv_status(&mut buf) {
                Ok(Recv::Ready(r)) => r,
                Ok(Recv::Empty) => return,
                Err(e) => {
                    debug!("status socket: {}", e);
                    return;
                }
            };
            // Other controllers' telemetry lands here too; only hints matter.
            if StatusDatagram::parse(&buf[..n]) == Some(StatusDatagram::Discovery)
                && self.peer.record(from)
            {
                info!("aggregator discovered at {}", from);
                io.sink.emit(&AppEvent::PeerDiscovered(from));
            }
        }
    }

    fn deliver<L, N, K, W, M, S>(
        &mut self,
        cmd: LightingCommand,
        io: &mut BridgeIo<L, N, K, W, M, S>,
    ) -> Option<LightingCommand>
    where
        K: StageKitPort,
        S: EventSink,
    {
        if !io.stagekit.is_attached() {
            trace!("Stage Kit not attached, dropping {}", cmd);
            return None;
        }
        match io.stagekit.send(cmd) {
            Ok(()) => {
                self.safety.note_delivered(cmd);
                io.sink.emit(&AppEvent::CommandApplied(cmd));
                Some(cmd)
            }
            Err(e) => {
                warn!("Stage Kit send failed: {}", e);
                None
            }
        }
    }

    fn track_peripheral<L, N, K, W, M, S>(&mut self, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        K: StageKitPort,
        S: EventSink,
    {
        let attached = io.stagekit.is_attached();
        match (self.state, attached) {
            (LinkState::Attached, false) => {
                warn!("Stage Kit detached");
                self.safety.note_detached();
                io.sink.emit(&AppEvent::PeripheralDetached);
                self.set_state(LinkState::Degraded, &mut io.sink);
            }
            (LinkState::Degraded, true) => self.set_state(LinkState::Attached, &mut io.sink),
            _ => {}
        }
    }

    fn send_telemetry<L, N, K, W, M, S>(&mut self, now_ms: u64, io: &mut BridgeIo<L, N, K, W, M, S>)
    where
        L: LinkPort,
        N: NetPort,
        K: StageKitPort,
    {
        let report = TelemetryReport::new(
            &self.identity,
            io.stagekit.is_attached(),
            io.link.rssi(),
            now_ms.saturating_sub(self.boot_ms),
        );
        let payload = match report.to_json() {
            Ok(p) => p,
            Err(e) => {
                warn!("telemetry encode failed: {}", e);
                return;
            }
        };
        let dest = self.peer.destination(self.broadcast, self.status_port);
        match io.net.send_status(&payload, dest) {
            Ok(()) => trace!("telemetry sent to {}", dest),
            Err(e) => debug!("telemetry send failed: {}", e),
        }
    }
}

/// Decode one event datagram, feed the tracker, and classify it for the drain.
fn classify<S: EventSink>(bytes: &[u8], now_ms: u64, tracker: &mut GameStateTracker, sink: &mut S) -> Polled {
    let Some(packet) = decode(bytes) else {
        return Polled::Invalid;
    };
    match packet.event_type() {
        Some(EventType::StageKit) => {
            LightingCommand::from_payload(packet.payload).map_or(Polled::Invalid, Polled::Lighting)
        }
        Some(EventType::Alive) => {
            tracker.apply_packet(&packet, now_ms);
            if let Some(build) = tracker.game_build() {
                sink.emit(&AppEvent::GameAlive(build.to_string()));
            }
            Polled::Other
        }
        _ => {
            if let Some(event) = tracker.apply_packet(&packet, now_ms) {
                sink.emit(&AppEvent::Lifecycle(event));
            }
            Polled::Other
        }
    }
}
