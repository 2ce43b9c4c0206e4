//! Device identity from the MAC address.
//!
//! Produces the stable id (`aa:bb:cc:dd:ee:ff`) and friendly name
//! (`StageKit ee:ff`) a controller reports in telemetry.  The aggregator
//! keys its fleet registry on the id, so it must survive reboots and IP
//! changes.

use crate::discovery::DeviceIdentity;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Fallback when no hardware address can be read.
pub const SIM_MAC: MacAddress = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE];

/// Read the factory MAC address from eFuse.
#[cfg(feature = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// First non-loopback interface address from sysfs, else [`SIM_MAC`].
#[cfg(not(feature = "espidf"))]
pub fn read_mac() -> MacAddress {
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return SIM_MAC;
    };
    let mut names: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n != "lo")
        .collect();
    names.sort();

    names
        .iter()
        .filter_map(|n| std::fs::read_to_string(format!("/sys/class/net/{n}/address")).ok())
        .filter_map(|s| parse_mac(s.trim()))
        .find(|mac| mac.iter().any(|&b| b != 0))
        .unwrap_or(SIM_MAC)
}

/// Parse `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(text: &str) -> Option<MacAddress> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(mac)
}

/// Identity for this device, with optional configured overrides.
pub fn identity(id_override: Option<&str>, name_override: Option<&str>) -> DeviceIdentity {
    DeviceIdentity::from_mac(read_mac()).with_overrides(id_override, name_override)
}
