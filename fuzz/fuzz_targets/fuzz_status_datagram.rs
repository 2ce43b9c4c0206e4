//! Fuzz target: `StatusDatagram::parse`
//!
//! The aggregator parses untrusted JSON from the whole LAN segment.
//!
//! cargo fuzz run fuzz_status_datagram

#![no_main]

use libfuzzer_sys::fuzz_target;
use stagekit_bridge::discovery::StatusDatagram;

fuzz_target!(|data: &[u8]| {
    if let Some(StatusDatagram::Telemetry(report)) = StatusDatagram::parse(data) {
        assert!(!report.id.is_empty());
        let _ = report.to_json();
    }
});
