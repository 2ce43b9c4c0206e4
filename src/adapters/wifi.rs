//! WiFi station link adapter.
//!
//! Implements [`LinkPort`] for the controller on ESP-IDF.  Association is
//! asynchronous: [`LinkPort::connect`] only starts it and reports
//! [`LinkError::Timeout`] until the station has an address, and
//! [`LinkPort::poll`] notices when it completes or drops.  The supervisor
//! sees a link that comes up between retries as one that "returned on
//! its own" and rebinds on the next tick.
//!
//! ## cfg gating
//!
//! - **`espidf` feature**: `esp_idf_svc::wifi::EspWifi` in station mode.
//! - **host**: a simulated radio so the association logic runs in tests.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::app::ports::{LinkError, LinkPort};

#[cfg(feature = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Validated station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    /// SSID: 1-32 printable ASCII bytes.  Password: empty (open network)
    /// or 8-64 bytes for WPA2.
    pub fn new(ssid: &str, password: &str) -> Result<Self, LinkError> {
        if ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        if !ssid.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
            return Err(LinkError::InvalidCredentials);
        }
        if !password.is_empty() && password.len() < 8 {
            return Err(LinkError::InvalidCredentials);
        }
        Ok(Self {
            ssid: ssid.try_into().map_err(|_| LinkError::InvalidCredentials)?,
            password: password.try_into().map_err(|_| LinkError::InvalidCredentials)?,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Association {
    Idle,
    Pending,
    Up,
}

pub struct WifiLink {
    credentials: WifiCredentials,
    association: Association,
    rssi: Option<i8>,
    ip: Option<Ipv4Addr>,
    #[cfg(feature = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(not(feature = "espidf"))]
    radio: SimRadio,
}

#[cfg(feature = "espidf")]
impl WifiLink {
    /// Configure and start the station.  Association begins on the first
    /// [`LinkPort::connect`].
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        credentials: WifiCredentials,
    ) -> Result<Self, LinkError> {
        let mut wifi = EspWifi::new(modem, sysloop, nvs).map_err(|e| {
            warn!("WiFi: driver init failed: {}", e);
            LinkError::Unavailable
        })?;

        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials.ssid().try_into().map_err(|_| LinkError::InvalidCredentials)?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidCredentials)?,
            auth_method: if credentials.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        wifi.set_configuration(&config).map_err(|e| {
            warn!("WiFi: configuration rejected: {}", e);
            LinkError::InvalidCredentials
        })?;
        wifi.start().map_err(|e| {
            warn!("WiFi: start failed: {}", e);
            LinkError::Unavailable
        })?;
        info!("WiFi: station started for '{}'", credentials.ssid());

        Ok(Self {
            credentials,
            association: Association::Idle,
            rssi: None,
            ip: None,
            wifi,
        })
    }

    fn platform_begin(&mut self) -> Result<(), LinkError> {
        // A stalled attempt is dropped before starting over.
        if self.association == Association::Pending {
            let _ = self.wifi.disconnect();
        }
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect request failed: {}", e);
            LinkError::ConnectionFailed
        })
    }

    fn platform_associated(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn platform_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    fn platform_rssi(&self) -> Option<i8> {
        // SAFETY: plain C record, filled in by the driver on success.
        let mut record: esp_idf_sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record) };
        (ret == esp_idf_sys::ESP_OK as i32).then_some(record.rssi)
    }
}

// ── Host simulation ───────────────────────────────────────────

/// Access point that associates on the poll after a request while in range.
#[cfg(not(feature = "espidf"))]
#[derive(Debug, Default)]
struct SimRadio {
    in_range: bool,
    requested: bool,
    associated: bool,
}

#[cfg(not(feature = "espidf"))]
impl WifiLink {
    pub fn simulated(credentials: WifiCredentials) -> Self {
        Self {
            credentials,
            association: Association::Idle,
            rssi: None,
            ip: None,
            radio: SimRadio {
                in_range: true,
                ..SimRadio::default()
            },
        }
    }

    /// Move the simulated access point in or out of range.
    pub fn set_in_range(&mut self, in_range: bool) {
        self.radio.in_range = in_range;
    }

    fn platform_begin(&mut self) -> Result<(), LinkError> {
        self.radio.requested = true;
        Ok(())
    }

    fn platform_associated(&mut self) -> bool {
        if !self.radio.in_range {
            self.radio.associated = false;
            self.radio.requested = false;
        } else if self.radio.requested {
            self.radio.associated = true;
        }
        self.radio.associated
    }

    fn platform_ip(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(192, 168, 4, 2))
    }

    fn platform_rssi(&self) -> Option<i8> {
        Some(-58)
    }
}

impl LinkPort for WifiLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        if self.association == Association::Up {
            return Ok(());
        }
        info!("WiFi: associating with '{}'", self.credentials.ssid());
        self.platform_begin()?;
        self.association = Association::Pending;
        // Completion is picked up by `poll`.
        Err(LinkError::Timeout)
    }

    fn is_connected(&self) -> bool {
        self.association == Association::Up
    }

    fn poll(&mut self) {
        let associated = self.platform_associated();
        match (self.association, associated) {
            (Association::Up, true) => self.rssi = self.platform_rssi(),
            (Association::Up, false) => {
                warn!("WiFi: connection to '{}' lost", self.credentials.ssid());
                self.association = Association::Idle;
                self.rssi = None;
                self.ip = None;
            }
            (_, true) => {
                self.association = Association::Up;
                self.ip = self.platform_ip();
                self.rssi = self.platform_rssi();
                info!("WiFi: associated, ip={:?} rssi={:?}", self.ip, self.rssi);
            }
            (_, false) => {}
        }
    }

    fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    fn local_addr(&self) -> Option<Ipv4Addr> {
        self.ip
    }
}
