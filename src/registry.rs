//! Device fleet registry (aggregator role).
//!
//! Keyed by the id a controller reports in its telemetry, so a device
//! that changes IP keeps its record.  Aging is explicit: the caller runs
//! [`DeviceRegistry::sweep`] on its own schedule.

use std::collections::BTreeMap;
use std::net::IpAddr;

use log::{debug, info};

use crate::discovery::TelemetryReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    /// No telemetry within the stale window.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: String,
    pub address: IpAddr,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub last_telemetry: TelemetryReport,
    pub status: DeviceStatus,
}

/// What a sweep changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub went_stale: Vec<String>,
    pub purged: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.went_stale.is_empty() && self.purged.is_empty()
    }
}

#[derive(Debug)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceRecord>,
    stale_after_ms: u64,
    purge_after_ms: u64,
}

impl DeviceRegistry {
    pub fn new(stale_after_ms: u64, purge_after_ms: u64) -> Self {
        Self {
            devices: BTreeMap::new(),
            stale_after_ms,
            purge_after_ms,
        }
    }

    /// Record a telemetry report.  Returns `true` for a newly seen device.
    pub fn observe(&mut self, address: IpAddr, report: TelemetryReport, now_ms: u64) -> bool {
        if let Some(rec) = self.devices.get_mut(&report.id) {
            if rec.status == DeviceStatus::Stale {
                info!("device {} back online", rec.id);
            }
            if rec.address != address {
                debug!("device {} moved {} -> {}", rec.id, rec.address, address);
            }
            rec.address = address;
            rec.last_seen_ms = now_ms;
            rec.last_telemetry = report;
            rec.status = DeviceStatus::Online;
            return false;
        }

        info!("new device {} ({}) at {}", report.id, report.name, address);
        self.devices.insert(
            report.id.clone(),
            DeviceRecord {
                id: report.id.clone(),
                address,
                first_seen_ms: now_ms,
                last_seen_ms: now_ms,
                last_telemetry: report,
                status: DeviceStatus::Online,
            },
        );
        true
    }

    /// Age records: stale after the stale window, removed after the purge window.
    pub fn sweep(&mut self, now_ms: u64) -> SweepReport {
        let mut report = SweepReport::default();

        for rec in self.devices.values_mut() {
            let silent = now_ms.saturating_sub(rec.last_seen_ms);
            if silent > self.purge_after_ms {
                report.purged.push(rec.id.clone());
            } else if silent > self.stale_after_ms && rec.status == DeviceStatus::Online {
                rec.status = DeviceStatus::Stale;
                report.went_stale.push(rec.id.clone());
            }
        }
        for id in &report.purged {
            self.devices.remove(id);
            info!("device {} purged", id);
        }
        for id in &report.went_stale {
            info!("device {} offline", id);
        }
        report
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    /// Records ordered by id.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.values().cloned().collect()
    }

    /// Address of an online device, for targeted commands.
    pub fn address_of(&self, id: &str) -> Option<IpAddr> {
        self.devices
            .get(id)
            .filter(|r| r.status == DeviceStatus::Online)
            .map(|r| r.address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
