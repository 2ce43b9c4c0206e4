//! Discovery & telemetry exchange.
//!
//! Both directions share the status port:
//!
//! ```text
//!   aggregator ── {"type":"discovery"} ──▶ broadcast:21071
//!                                              │
//!                         controller records sender IP (PeerAddressCache)
//!                                              │
//!   aggregator ◀── TelemetryReport JSON ── controller (unicast if known,
//!                                                      broadcast otherwise)
//! ```
//!
//! Everything here is best effort.  A lost beacon or report is repaired
//! by the next one.

use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// `type` value of a discovery hint.
pub const DISCOVERY_TYPE: &str = "discovery";

/// Upper bound on any status datagram we send or accept.
pub const MAX_STATUS_DATAGRAM: usize = 1024;

// ---------------------------------------------------------------------------
// Peer address cache
// ---------------------------------------------------------------------------

/// Most-recent-wins memory of the aggregator's address.
///
/// No expiry: a controller keeps unicasting to the last aggregator that
/// announced itself until another one does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerAddressCache {
    peer: Option<IpAddr>,
}

impl PeerAddressCache {
    pub const fn new() -> Self {
        Self { peer: None }
    }

    /// Remember `addr`.  Returns `true` when it differs from the cached one.
    pub fn record(&mut self, addr: IpAddr) -> bool {
        let changed = self.peer != Some(addr);
        self.peer = Some(addr);
        changed
    }

    pub fn get(&self) -> Option<IpAddr> {
        self.peer
    }

    /// Where the next status report goes.
    pub fn destination(&self, fallback: Ipv4Addr, port: u16) -> SocketAddr {
        SocketAddr::new(self.peer.unwrap_or(IpAddr::V4(fallback)), port)
    }
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DiscoveryHint<'a> {
    // Cow: escaped JSON strings cannot be borrowed from the input.
    #[serde(rename = "type", borrow)]
    kind: Cow<'a, str>,
}

/// Serialized discovery hint.
pub fn discovery_payload() -> Vec<u8> {
    // Serializing a struct of one string cannot fail.
    serde_json::to_vec(&DiscoveryHint {
        kind: Cow::Borrowed(DISCOVERY_TYPE),
    })
    .unwrap_or_default()
}

/// Controller status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub usb_status: String,
    /// dBm; 0 when unknown.
    #[serde(default)]
    pub wifi_signal: i32,
    /// Seconds since boot.
    #[serde(default)]
    pub uptime: f64,
}

impl TelemetryReport {
    pub const USB_CONNECTED: &'static str = "Connected";
    pub const USB_DISCONNECTED: &'static str = "Disconnected";

    pub fn new(identity: &DeviceIdentity, peripheral_attached: bool, rssi: Option<i8>, uptime_ms: u64) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            usb_status: if peripheral_attached {
                Self::USB_CONNECTED
            } else {
                Self::USB_DISCONNECTED
            }
            .to_string(),
            wifi_signal: rssi.map_or(0, i32::from),
            uptime: uptime_ms as f64 / 1000.0,
        }
    }

    pub fn peripheral_connected(&self) -> bool {
        self.usb_status == Self::USB_CONNECTED
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A datagram received on the status port.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusDatagram {
    Discovery,
    Telemetry(TelemetryReport),
}

impl StatusDatagram {
    /// Classify a status-port datagram.  Anything unrecognised is `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if let Ok(hint) = serde_json::from_slice::<DiscoveryHint<'_>>(bytes) {
            return (hint.kind == DISCOVERY_TYPE).then_some(Self::Discovery);
        }
        serde_json::from_slice::<TelemetryReport>(bytes)
            .ok()
            .map(Self::Telemetry)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// How a controller names itself in telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable id, e.g. `aa:bb:cc:dd:ee:ff`.
    pub id: String,
    /// Friendly name, e.g. `StageKit ee:ff`.
    pub name: String,
}

impl DeviceIdentity {
    /// Identity derived from a MAC address.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let id = mac
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        let name = format!("StageKit {:02x}:{:02x}", mac[4], mac[5]);
        Self { id, name }
    }

    /// Apply configured overrides.
    pub fn with_overrides(mut self, id: Option<&str>, name: Option<&str>) -> Self {
        if let Some(id) = id {
            self.id = id.to_string();
        }
        if let Some(name) = name {
            self.name = name.to_string();
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Aggregator beacon
// ---------------------------------------------------------------------------

/// Periodic discovery broadcast, independent of which controllers are known.
#[derive(Debug)]
pub struct DiscoveryBeacon {
    payload: Vec<u8>,
    destination: SocketAddr,
    interval_ms: u64,
    last_sent_ms: Option<u64>,
}

impl DiscoveryBeacon {
    pub fn new(broadcast: Ipv4Addr, port: u16, interval_ms: u64) -> Self {
        Self {
            payload: discovery_payload(),
            destination: SocketAddr::new(IpAddr::V4(broadcast), port),
            interval_ms,
            last_sent_ms: None,
        }
    }

    /// Returns the datagram and destination when a beacon is due.
    /// The first call is always due.
    pub fn poll(&mut self, now_ms: u64) -> Option<(&[u8], SocketAddr)> {
        let due = self
            .last_sent_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms);
        if !due {
            return None;
        }
        self.last_sent_ms = Some(now_ms);
        Some((&self.payload, self.destination))
    }
}
