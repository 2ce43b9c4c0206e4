//! Mock port adapters for supervisor integration tests.
//!
//! Every port records what the supervisor did to it, so tests can drive
//! the loop with scripted network traffic and a fake clock and then
//! assert on the full history.

use std::cell::Cell;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use stagekit_bridge::app::events::AppEvent;
use stagekit_bridge::app::ports::{
    EventSink, LinkError, LinkPort, MemoryPort, NetPort, PeripheralError, Recv, StageKitPort, TransportError,
    WatchdogPort,
};
use stagekit_bridge::config::BridgeConfig;
use stagekit_bridge::discovery::DeviceIdentity;
use stagekit_bridge::protocol::{encode, EventType, LightingCommand};
use stagekit_bridge::supervisor::{BridgeIo, Supervisor, TickOutcome};

// ── Net ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNet {
    pub open: bool,
    pub reopens: u32,
    pub fail_reopen: bool,
    pub events: VecDeque<Vec<u8>>,
    pub status: VecDeque<(Vec<u8>, IpAddr)>,
    /// Next `recv_event` fails with this once.
    pub event_fault: bool,
    pub sent_status: Vec<(Vec<u8>, SocketAddr)>,
}

#[allow(dead_code)]
impl MockNet {
    pub fn push_event(&mut self, event: EventType, payload: &[u8]) {
        let datagram = encode(event, payload).expect("payload fits");
        self.events.push_back(datagram.to_vec());
    }

    pub fn push_lighting(&mut self, cmd: LightingCommand) {
        self.push_event(EventType::StageKit, &cmd.to_payload());
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.events.push_back(bytes.to_vec());
    }

    pub fn push_status(&mut self, json: &str, from: IpAddr) {
        self.status.push_back((json.as_bytes().to_vec(), from));
    }

    pub fn telemetry_destinations(&self) -> Vec<SocketAddr> {
        self.sent_status.iter().map(|(_, d)| *d).collect()
    }
}

impl NetPort for MockNet {
    fn reopen(&mut self) -> Result<(), TransportError> {
        self.reopens += 1;
        if self.fail_reopen {
            self.open = false;
            return Err(TransportError::NotOpen);
        }
        self.open = true;
        Ok(())
    }

    fn recv_event(&mut self, buf: &mut [u8]) -> Result<Recv<usize>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if std::mem::take(&mut self.event_fault) {
            return Err(TransportError::Receive(std::io::Error::other("injected")));
        }
        match self.events.pop_front() {
            Some(d) => {
                let n = d.len().min(buf.len());
                buf[..n].copy_from_slice(&d[..n]);
                Ok(Recv::Ready(n))
            }
            None => Ok(Recv::Empty),
        }
    }

    fn recv_status(&mut self, buf: &mut [u8]) -> Result<Recv<(usize, IpAddr)>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        match self.status.pop_front() {
            Some((d, from)) => {
                let n = d.len().min(buf.len());
                buf[..n].copy_from_slice(&d[..n]);
                Ok(Recv::Ready((n, from)))
            }
            None => Ok(Recv::Empty),
        }
    }

    fn send_status(&mut self, payload: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.sent_status.push((payload.to_vec(), dest));
        Ok(())
    }
}

// ── Link ──────────────────────────────────────────────────────

pub struct MockLink {
    pub up: bool,
    /// Whether `connect()` succeeds.
    pub reachable: bool,
    pub connects: u32,
}

impl MockLink {
    pub fn up() -> Self {
        Self {
            up: true,
            reachable: true,
            connects: 0,
        }
    }

    #[allow(dead_code)]
    pub fn down() -> Self {
        Self {
            up: false,
            reachable: false,
            connects: 0,
        }
    }
}

impl LinkPort for MockLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.connects += 1;
        if self.reachable {
            self.up = true;
            Ok(())
        } else {
            Err(LinkError::Timeout)
        }
    }

    fn is_connected(&self) -> bool {
        self.up
    }

    fn poll(&mut self) {}

    fn rssi(&self) -> Option<i8> {
        self.up.then_some(-55)
    }

    fn local_addr(&self) -> Option<Ipv4Addr> {
        self.up.then_some(Ipv4Addr::new(192, 168, 1, 50))
    }
}

// ── Stage Kit ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockStageKit {
    pub attached: bool,
    /// Whether `try_attach()` succeeds.
    pub present: bool,
    pub attach_attempts: u32,
    pub sent: Vec<LightingCommand>,
}

impl MockStageKit {
    pub fn present() -> Self {
        Self {
            present: true,
            ..Self::default()
        }
    }

    #[allow(dead_code)]
    pub fn last(&self) -> Option<LightingCommand> {
        self.sent.last().copied()
    }

    #[allow(dead_code)]
    pub fn unplug(&mut self) {
        self.attached = false;
        self.present = false;
    }
}

impl StageKitPort for MockStageKit {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn try_attach(&mut self) -> Result<(), PeripheralError> {
        self.attach_attempts += 1;
        if self.present {
            self.attached = true;
            Ok(())
        } else {
            Err(PeripheralError::NotFound)
        }
    }

    fn send(&mut self, command: LightingCommand) -> Result<(), PeripheralError> {
        if !self.attached {
            return Err(PeripheralError::Detached);
        }
        self.sent.push(command);
        Ok(())
    }
}

// ── Watchdog / memory / sink ─────────────────────────────────

#[derive(Default)]
pub struct MockWatchdog {
    pub feeds: Cell<u64>,
}

impl WatchdogPort for MockWatchdog {
    fn feed(&self) {
        self.feeds.set(self.feeds.get() + 1);
    }
}

#[derive(Default)]
pub struct MockMemory {
    pub free: Option<usize>,
    pub reclaims: u32,
}

impl MemoryPort for MockMemory {
    fn free_bytes(&self) -> Option<usize> {
        self.free
    }

    fn reclaim(&mut self) {
        self.reclaims += 1;
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type MockIo = BridgeIo<MockLink, MockNet, MockStageKit, MockWatchdog, MockMemory, RecordingSink>;

/// Supervisor plus mock I/O plus a fake clock.
pub struct Rig {
    pub sup: Supervisor,
    pub io: MockIo,
    pub now: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with(config, MockLink::up(), MockStageKit::present())
    }

    pub fn with(config: BridgeConfig, link: MockLink, stagekit: MockStageKit) -> Self {
        let identity = DeviceIdentity::from_mac([0x24, 0x6F, 0x28, 0x01, 0xAB, 0xCD]);
        let mut sup = Supervisor::new(&config, identity, 0);
        let mut io = BridgeIo {
            link,
            net: MockNet::default(),
            stagekit,
            watchdog: MockWatchdog::default(),
            memory: MockMemory::default(),
            sink: RecordingSink::default(),
        };
        sup.start(&mut io).expect("mock sockets bind");
        Self { sup, io, now: 0 }
    }

    /// Advance the clock by `ms`, then tick once.
    pub fn step(&mut self, ms: u64) -> TickOutcome {
        self.now += ms;
        self.sup.tick(self.now, &mut self.io)
    }

    /// Tick every `every` ms until `total` ms have elapsed.
    pub fn run(&mut self, total: u64, every: u64) {
        let end = self.now + total;
        while self.now < end {
            self.step(every);
        }
    }
}
