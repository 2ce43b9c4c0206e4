//! Bridge configuration.
//!
//! All tunable parameters for both roles.  Every field has a default, so
//! an empty (or absent) TOML file yields a working controller on the
//! standard RB3E ports.  The binaries layer CLI overrides on top and call
//! [`BridgeConfig::validate`] once before anything binds.

use core::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// RB3E event stream port.
pub const DEFAULT_EVENT_PORT: u16 = 21070;
/// Telemetry / discovery port.
pub const DEFAULT_STATUS_PORT: u16 = 21071;

/// Core configuration shared by the controller and the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // --- Network ---
    /// Local address both sockets bind to.
    pub bind_addr: IpAddr,
    pub event_port: u16,
    pub status_port: u16,
    /// Fallback destination for telemetry when no peer has been discovered.
    pub broadcast_addr: Ipv4Addr,
    /// Bounded blocking receive used by the aggregator threads.
    pub receive_timeout_ms: u64,

    // --- Link (controller on ESP-IDF) ---
    /// Access point the station joins.  Absent on hosts whose network the OS manages.
    pub wifi_ssid: Option<String>,
    /// Empty for an open network.
    pub wifi_password: String,

    // --- Identity ---
    /// Overrides the MAC-derived device id.
    pub device_id: Option<String>,
    /// Overrides the MAC-derived friendly name.
    pub device_name: Option<String>,

    // --- Safety / liveness ---
    /// Silence after which active lights are forced off.
    pub safety_cutoff_ms: u64,
    pub watchdog_timeout_ms: u64,

    // --- Recovery ---
    pub reconnect_backoff_ms: u64,
    pub peripheral_retry_ms: u64,

    // --- Periodic tasks ---
    pub heartbeat_interval_ms: u64,
    pub telemetry_interval_ms: u64,

    // --- Pacing / memory ---
    pub loop_delay_active_us: u64,
    pub loop_delay_idle_us: u64,
    /// Idle period after which memory is reclaimed.
    pub idle_reclaim_ms: u64,
    /// Reclaim immediately when free heap drops below this.
    pub reclaim_free_threshold_bytes: usize,
    /// Datagrams consumed per drain pass before yielding to the loop.
    pub max_drain_per_tick: usize,

    // --- Aggregator ---
    pub device_stale_ms: u64,
    pub device_purge_ms: u64,
    pub discovery_interval_ms: u64,
    /// Delay applied before `SongStarted` reaches subscribers.
    pub song_start_delay_ms: u64,
    /// The game link counts as active this long after its last packet.
    pub game_activity_window_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            // Network
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            event_port: DEFAULT_EVENT_PORT,
            status_port: DEFAULT_STATUS_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            receive_timeout_ms: 500,

            // Link
            wifi_ssid: None,
            wifi_password: String::new(),

            // Identity
            device_id: None,
            device_name: None,

            // Safety
            safety_cutoff_ms: 5_000,
            watchdog_timeout_ms: 8_000,

            // Recovery
            reconnect_backoff_ms: 5_000,
            peripheral_retry_ms: 5_000,

            // Periodic
            heartbeat_interval_ms: 2_000,
            telemetry_interval_ms: 5_000,

            // Pacing / memory
            loop_delay_active_us: 100,
            loop_delay_idle_us: 1_000,
            idle_reclaim_ms: 10_000,
            reclaim_free_threshold_bytes: 50_000,
            max_drain_per_tick: 256,

            // Aggregator
            device_stale_ms: 10_000,
            device_purge_ms: 30_000,
            discovery_interval_ms: 5_000,
            song_start_delay_ms: 0,
            game_activity_window_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file.  Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject configurations the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_port == 0 || self.status_port == 0 {
            return Err(ConfigError::Invalid("ports must be non-zero"));
        }
        if self.event_port == self.status_port {
            return Err(ConfigError::Invalid("event_port and status_port must differ"));
        }

        let intervals = [
            ("safety_cutoff_ms", self.safety_cutoff_ms),
            ("watchdog_timeout_ms", self.watchdog_timeout_ms),
            ("reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("peripheral_retry_ms", self.peripheral_retry_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("telemetry_interval_ms", self.telemetry_interval_ms),
            ("idle_reclaim_ms", self.idle_reclaim_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("device_stale_ms", self.device_stale_ms),
            ("device_purge_ms", self.device_purge_ms),
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("game_activity_window_ms", self.game_activity_window_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroInterval(name));
        }

        if self.max_drain_per_tick == 0 {
            return Err(ConfigError::Invalid("max_drain_per_tick must be at least 1"));
        }
        if self.loop_delay_active_us > self.loop_delay_idle_us {
            return Err(ConfigError::Invalid(
                "loop_delay_active_us must not exceed loop_delay_idle_us",
            ));
        }
        if self.device_stale_ms >= self.device_purge_ms {
            return Err(ConfigError::Invalid("device_stale_ms must be below device_purge_ms"));
        }
        // A watchdog shorter than one blocking receive would fire on a healthy loop.
        if self.watchdog_timeout_ms <= self.receive_timeout_ms {
            return Err(ConfigError::Invalid(
                "watchdog_timeout_ms must exceed receive_timeout_ms",
            ));
        }
        Ok(())
    }
}

/// Configuration faults.  Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    /// A periodic interval was configured as zero.
    ZeroInterval(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read config file: {msg}"),
            Self::Parse(msg) => write!(f, "invalid TOML: {msg}"),
            Self::ZeroInterval(name) => write!(f, "{name} must be greater than zero"),
            Self::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
