//! Fuzz target: `protocol::decode`
//!
//! Arbitrary datagrams must never panic the decoder, and anything it
//! accepts must re-encode to the same header and payload.
//!
//! cargo fuzz run fuzz_packet_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use stagekit_bridge::protocol::codec::{encode_with_platform, HEADER_SIZE};
use stagekit_bridge::protocol::{decode, EventType, LightingCommand};

fuzz_target!(|data: &[u8]| {
    let Some(packet) = decode(data) else {
        return;
    };

    assert!(data.len() >= HEADER_SIZE + packet.payload.len());
    assert_eq!(packet.payload, &data[HEADER_SIZE..HEADER_SIZE + packet.payload.len()]);

    if let Some(event) = packet.event_type() {
        let again = encode_with_platform(event, packet.platform, packet.payload)
            .expect("decoded payload fits in a datagram");
        assert_eq!(&again[..], &data[..again.len()]);

        if event == EventType::StageKit {
            let _ = LightingCommand::from_payload(packet.payload).map(|c| c.hid_report());
        }
    }
});
