//! Supervisor loop against mock ports with a fake clock.
//!
//! Covers the link state machine, the drain, the safety cutoff, peer
//! discovery and peripheral presence, all through `Supervisor::tick`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::mock_io::{MockLink, MockMemory, MockNet, MockStageKit, MockWatchdog, RecordingSink, Rig};

use stagekit_bridge::adapters::link::HostLink;
use stagekit_bridge::adapters::udp::UdpNet;
use stagekit_bridge::adapters::wifi::{WifiCredentials, WifiLink};
use stagekit_bridge::app::events::{AppEvent, LifecycleEvent};
use stagekit_bridge::app::ports::TransportError;
use stagekit_bridge::config::BridgeConfig;
use stagekit_bridge::discovery::{DeviceIdentity, StatusDatagram};
use stagekit_bridge::Error;
use stagekit_bridge::game::GamePhase;
use stagekit_bridge::protocol::stagekit::{SK_LED_BLUE, SK_LED_RED};
use stagekit_bridge::protocol::{EventType, LightingCommand};
use stagekit_bridge::supervisor::{BridgeIo, LinkState, Supervisor};

const RED: LightingCommand = LightingCommand::new(0xFF, SK_LED_RED);
const BLUE: LightingCommand = LightingCommand::new(0x0F, SK_LED_BLUE);

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
}

/// Attached rig whose first telemetry report has gone out (now = 20).
fn booted() -> Rig {
    booted_with(BridgeConfig::default())
}

fn booted_with(config: BridgeConfig) -> Rig {
    let mut rig = Rig::new(config);
    rig.step(10);
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Attached);
    rig
}

fn count_all_off(rig: &Rig) -> usize {
    rig.io.stagekit.sent.iter().filter(|c| c.is_all_off()).count()
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_attaches_link_and_peripheral_on_first_tick() {
    let mut rig = Rig::new(BridgeConfig::default());
    let out = rig.step(10);

    assert_eq!(out.state, LinkState::Attached);
    assert!(rig.io.stagekit.attached);
    assert_eq!(rig.io.net.reopens, 1);
    assert_eq!(
        rig.io.sink.events,
        vec![
            AppEvent::Started,
            AppEvent::PeripheralAttached,
            AppEvent::StateChanged {
                from: LinkState::Disconnected,
                to: LinkState::Connecting
            },
            AppEvent::StateChanged {
                from: LinkState::Connecting,
                to: LinkState::Attached
            },
        ]
    );
}

#[test]
fn first_telemetry_is_broadcast_right_after_attach() {
    let rig = booted();
    let (payload, dest) = rig.io.net.sent_status.first().expect("telemetry sent");
    assert_eq!(*dest, SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), 21071));

    let Some(StatusDatagram::Telemetry(report)) = StatusDatagram::parse(payload) else {
        panic!("telemetry must parse");
    };
    assert_eq!(report.id, "24:6f:28:01:ab:cd");
    assert_eq!(report.name, "StageKit ab:cd");
    assert!(report.peripheral_connected());
    assert_eq!(report.wifi_signal, -55);
}

#[test]
fn boot_without_peripheral_is_degraded() {
    let mut rig = Rig::with(BridgeConfig::default(), MockLink::up(), MockStageKit::default());
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Degraded);

    // A Stage Kit that never attached cannot detach.
    assert_eq!(rig.io.sink.count(|e| *e == AppEvent::PeripheralDetached), 0);
    assert!(rig.io.sink.events.contains(&AppEvent::StateChanged {
        from: LinkState::Connecting,
        to: LinkState::Degraded
    }));
    assert!(!rig.io.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::StateChanged {
            to: LinkState::Attached,
            ..
        }
    )));

    // Reconnecting without the peripheral lands in Degraded again, quietly.
    rig.io.link.up = false;
    rig.step(10);
    rig.io.link.up = true;
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Degraded);
    assert_eq!(rig.io.sink.count(|e| *e == AppEvent::PeripheralDetached), 0);
}

#[test]
fn startup_fails_when_sockets_cannot_bind() {
    let config = BridgeConfig::default();
    let identity = DeviceIdentity::from_mac([0x24, 0x6F, 0x28, 0x01, 0xAB, 0xCD]);
    let mut sup = Supervisor::new(&config, identity, 0);
    let mut io = BridgeIo {
        link: MockLink::up(),
        net: MockNet {
            fail_reopen: true,
            ..MockNet::default()
        },
        stagekit: MockStageKit::present(),
        watchdog: MockWatchdog::default(),
        memory: MockMemory::default(),
        sink: RecordingSink::default(),
    };

    assert!(matches!(sup.start(&mut io), Err(Error::Transport(_))));
    assert_eq!(io.net.reopens, 1);
    assert!(io.sink.events.is_empty());
}

#[test]
fn startup_fails_when_event_port_is_taken() {
    let holder = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let taken = holder.local_addr().unwrap().port();

    let config = BridgeConfig::default();
    let identity = DeviceIdentity::from_mac([0x24, 0x6F, 0x28, 0x01, 0xAB, 0xCD]);
    let mut sup = Supervisor::new(&config, identity, 0);
    let mut io = BridgeIo {
        link: HostLink::always_up(),
        net: UdpNet::new(IpAddr::V4(Ipv4Addr::LOCALHOST), taken, 0),
        stagekit: MockStageKit::present(),
        watchdog: MockWatchdog::default(),
        memory: MockMemory::default(),
        sink: RecordingSink::default(),
    };

    let err = sup.start(&mut io).unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Bind(_))), "{err}");
    assert_eq!(sup.state(), LinkState::Disconnected);
}

// ── Drain ─────────────────────────────────────────────────────

#[test]
fn only_the_newest_lighting_command_is_applied() {
    let mut rig = booted();
    rig.io.net.push_lighting(RED);
    rig.io.net.push_lighting(LightingCommand::ALL_OFF);
    rig.io.net.push_lighting(BLUE);

    let out = rig.step(10);
    assert_eq!(out.received, 3);
    assert_eq!(out.applied, Some(BLUE));
    assert_eq!(rig.io.stagekit.sent, vec![BLUE]);
    assert_eq!(rig.sup.stats().superseded, 2);
    assert!(rig.sup.lights_active());
}

#[test]
fn drain_is_capped_per_tick() {
    let config = BridgeConfig {
        max_drain_per_tick: 4,
        ..BridgeConfig::default()
    };
    let mut rig = booted_with(config);
    for left in 0..10u8 {
        rig.io.net.push_lighting(LightingCommand::new(left, SK_LED_RED));
    }

    let first = rig.step(1);
    assert_eq!((first.received, first.applied), (4, Some(LightingCommand::new(3, SK_LED_RED))));
    let second = rig.step(1);
    assert_eq!((second.received, second.applied), (4, Some(LightingCommand::new(7, SK_LED_RED))));
    let third = rig.step(1);
    assert_eq!((third.received, third.applied), (2, Some(LightingCommand::new(9, SK_LED_RED))));
}

#[test]
fn malformed_datagrams_are_counted_and_skipped() {
    let mut rig = booted();
    rig.io.net.push_raw(b"garbage!");
    rig.io.net.push_raw(&[0x52, 0x42, 0x33]);
    // StageKit packet with a one-byte payload.
    rig.io.net.push_event(EventType::StageKit, &[0x01]);

    let out = rig.step(10);
    assert_eq!(out.received, 3);
    assert_eq!(out.applied, None);
    assert_eq!(rig.sup.stats().invalid, 3);
    assert!(rig.io.stagekit.sent.is_empty());
}

#[test]
fn pacing_follows_traffic() {
    let mut rig = booted();
    let idle = rig.step(10).delay;
    rig.io.net.push_lighting(RED);
    let active = rig.step(10).delay;
    assert!(active < idle);
}

// ── Game state ────────────────────────────────────────────────

#[test]
fn song_lifecycle_flows_to_the_sink() {
    let mut rig = booted();
    rig.io.net.push_event(EventType::SongName, b"Song\0");
    rig.io.net.push_event(EventType::SongArtist, b"Artist");
    rig.io.net.push_event(EventType::SongShortname, b"short");
    rig.io.net.push_event(EventType::State, b"1");
    rig.step(10);
    assert_eq!(rig.sup.tracker().phase(), GamePhase::Playing);

    rig.io.net.push_event(EventType::State, b"0");
    rig.step(2_000);

    let lifecycle: Vec<_> = rig
        .io
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Lifecycle(l) => Some(l.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle.len(), 3);
    assert!(matches!(&lifecycle[0], LifecycleEvent::MetadataReady(s) if s.song == "Song"));
    assert!(matches!(&lifecycle[1], LifecycleEvent::SongStarted(s) if s.shortname == "short"));
    match &lifecycle[2] {
        LifecycleEvent::SongEnded { song, elapsed } => {
            assert_eq!(song.artist, "Artist");
            assert_eq!(elapsed.as_millis(), 2_000);
        }
        other => panic!("expected SongEnded, got {:?}", other),
    }
    assert_eq!(rig.sup.tracker().state().song_name, "");
}

#[test]
fn alive_reports_game_build() {
    let mut rig = booted();
    rig.io.net.push_event(EventType::Alive, b"RB3E 1.2.0\0");
    rig.step(10);
    assert!(rig.io.sink.events.contains(&AppEvent::GameAlive("RB3E 1.2.0".into())));
}

// ── Safety cutoff ─────────────────────────────────────────────

#[test]
fn silence_forces_all_off_exactly_once() {
    let mut rig = booted();
    rig.io.net.push_lighting(RED);
    rig.step(10);
    assert!(rig.sup.lights_active());

    rig.run(4_900, 100);
    assert_eq!(rig.sup.safety_trips(), 0);

    rig.run(1_100, 100);
    assert_eq!(rig.sup.safety_trips(), 1);
    assert_eq!(rig.io.stagekit.last(), Some(LightingCommand::ALL_OFF));
    assert!(!rig.sup.lights_active());

    rig.run(20_000, 250);
    assert_eq!(rig.sup.safety_trips(), 1);
    assert_eq!(count_all_off(&rig), 1);
    assert_eq!(rig.io.sink.count(|e| matches!(e, AppEvent::SafetyCutoff { .. })), 1);
}

#[test]
fn game_all_off_does_not_arm_the_cutoff() {
    let mut rig = booted();
    rig.io.net.push_lighting(LightingCommand::ALL_OFF);
    rig.step(10);
    rig.run(10_000, 100);
    assert_eq!(rig.sup.safety_trips(), 0);
}

#[test]
fn steady_traffic_keeps_lights_on() {
    let mut rig = booted();
    for _ in 0..100 {
        rig.io.net.push_lighting(RED);
        rig.step(100);
    }
    assert_eq!(rig.sup.safety_trips(), 0);
    assert!(rig.sup.lights_active());
}

#[test]
fn cutoff_still_fires_while_link_is_down() {
    let mut rig = booted();
    rig.io.net.push_lighting(RED);
    rig.step(10);

    rig.io.link.up = false;
    rig.io.link.reachable = false;
    rig.run(6_000, 100);

    assert_eq!(rig.sup.state(), LinkState::Connecting);
    assert_eq!(rig.sup.safety_trips(), 1);
    assert_eq!(rig.io.stagekit.last(), Some(LightingCommand::ALL_OFF));
}

// ── Link recovery ─────────────────────────────────────────────

#[test]
fn link_loss_retries_on_backoff_and_keeps_feeding_watchdog() {
    let mut rig = booted();
    rig.io.link.up = false;
    rig.io.link.reachable = false;

    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Connecting);
    assert_eq!(rig.io.link.connects, 1, "retry is immediate on loss");

    let feeds = rig.io.watchdog.feeds.get();
    rig.run(5_000, 100);
    assert_eq!(rig.io.watchdog.feeds.get(), feeds + 50);
    assert_eq!(rig.io.link.connects, 2);

    rig.io.link.reachable = true;
    rig.run(5_000, 100);
    assert_eq!(rig.sup.state(), LinkState::Attached);
    assert_eq!(rig.io.net.reopens, 2);
}

#[test]
fn link_that_returns_by_itself_rebinds_sockets() {
    let mut rig = booted();
    rig.io.link.up = false;
    rig.io.link.reachable = false;
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Connecting);

    rig.io.link.up = true;
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Attached);
    assert_eq!(rig.io.net.reopens, 2);
}

#[test]
fn traffic_is_not_drained_while_connecting() {
    let mut rig = booted();
    rig.io.link.up = false;
    rig.io.link.reachable = false;
    rig.step(10);

    rig.io.net.push_lighting(RED);
    let out = rig.step(10);
    assert_eq!(out.received, 0);
    assert!(rig.io.stagekit.sent.is_empty());
}

#[test]
fn receive_fault_reopens_sockets() {
    let mut rig = booted();
    rig.io.net.event_fault = true;
    rig.step(10);
    assert_eq!(rig.io.net.reopens, 2);
    assert_eq!(rig.sup.state(), LinkState::Attached);
}

#[test]
fn failed_rebind_retries_on_backoff() {
    let mut rig = booted();
    rig.io.net.event_fault = true;
    rig.io.net.fail_reopen = true;
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Connecting);
    assert_eq!(rig.io.net.reopens, 2);

    // Link is still up, but rebinding waits for the backoff.
    rig.run(1_000, 10);
    assert_eq!(rig.sup.state(), LinkState::Connecting);
    assert_eq!(rig.io.net.reopens, 2);

    // At most one attempt per 5 s window.
    rig.run(20_000, 10);
    let attempts = rig.io.net.reopens - 2;
    assert!((3..=4).contains(&attempts), "{attempts} rebind attempts in 20 s");
    assert_eq!(rig.sup.state(), LinkState::Connecting);

    rig.io.net.fail_reopen = false;
    rig.run(5_000, 10);
    assert_eq!(rig.sup.state(), LinkState::Attached);
}

#[test]
fn wifi_station_associates_then_recovers_on_backoff() {
    let config = BridgeConfig::default();
    let identity = DeviceIdentity::from_mac([0x24, 0x6F, 0x28, 0x01, 0xAB, 0xCD]);
    let mut sup = Supervisor::new(&config, identity, 0);
    let mut io = BridgeIo {
        link: WifiLink::simulated(WifiCredentials::new("RockBand", "password1").unwrap()),
        net: MockNet::default(),
        stagekit: MockStageKit::present(),
        watchdog: MockWatchdog::default(),
        memory: MockMemory::default(),
        sink: RecordingSink::default(),
    };
    sup.start(&mut io).unwrap();

    // First retry starts association; the next poll completes it.
    sup.tick(10, &mut io);
    assert_eq!(sup.state(), LinkState::Connecting);
    sup.tick(20, &mut io);
    assert_eq!(sup.state(), LinkState::Attached);
    assert_eq!(io.net.reopens, 1, "startup sockets are still valid");

    io.link.set_in_range(false);
    let mut now = 30;
    sup.tick(now, &mut io);
    assert_eq!(sup.state(), LinkState::Connecting);

    while now < 1_000 {
        now += 10;
        sup.tick(now, &mut io);
    }
    io.link.set_in_range(true);

    // The AP is back, but no new attempt before the backoff elapses.
    while now < 5_000 {
        now += 10;
        sup.tick(now, &mut io);
    }
    assert_eq!(sup.state(), LinkState::Connecting);

    while now < 6_000 {
        now += 10;
        sup.tick(now, &mut io);
    }
    assert_eq!(sup.state(), LinkState::Attached);
    assert_eq!(io.net.reopens, 2);
}

// ── Peripheral ────────────────────────────────────────────────

#[test]
fn unplug_degrades_then_retry_reattaches() {
    let mut rig = booted();
    rig.io.stagekit.unplug();
    rig.step(10);
    assert_eq!(rig.sup.state(), LinkState::Degraded);
    assert!(rig.io.sink.events.contains(&AppEvent::PeripheralDetached));

    rig.io.net.push_lighting(RED);
    let out = rig.step(10);
    assert_eq!(out.received, 1);
    assert_eq!(out.applied, None);
    assert!(rig.io.stagekit.sent.is_empty());

    rig.io.stagekit.present = true;
    rig.run(5_000, 100);
    assert_eq!(rig.sup.state(), LinkState::Attached);
    assert_eq!(rig.io.sink.count(|e| *e == AppEvent::PeripheralAttached), 2);
}

#[test]
fn unplug_while_lit_disarms_cutoff() {
    let mut rig = booted();
    rig.io.net.push_lighting(RED);
    rig.step(10);
    rig.io.stagekit.unplug();
    rig.run(6_000, 100);
    assert_eq!(rig.sup.safety_trips(), 0);
}

#[test]
fn shutdown_turns_the_rig_off() {
    let mut rig = booted();
    rig.io.net.push_lighting(RED);
    rig.step(10);
    rig.sup.shutdown(&mut rig.io);
    assert_eq!(rig.io.stagekit.last(), Some(LightingCommand::ALL_OFF));
}

// ── Discovery ─────────────────────────────────────────────────

#[test]
fn discovery_hint_redirects_telemetry_most_recent_wins() {
    let mut rig = booted();
    rig.io.net.push_status(r#"{"type":"discovery"}"#, ip(10));
    rig.step(10);
    assert_eq!(rig.sup.peer().get(), Some(ip(10)));
    assert!(rig.io.sink.events.contains(&AppEvent::PeerDiscovered(ip(10))));

    rig.run(5_000, 100);
    assert_eq!(rig.io.net.telemetry_destinations().last(), Some(&SocketAddr::new(ip(10), 21071)));

    // Repeat hints are silent; another controller's telemetry is ignored.
    rig.io.net.push_status(r#"{"type":"discovery"}"#, ip(10));
    rig.io.net.push_status(r#"{"id":"aa:bb:cc:dd:ee:ff","usb_status":"Connected"}"#, ip(12));
    rig.io.net.push_status(r#"{"type":"discovery"}"#, ip(11));
    rig.step(10);
    assert_eq!(rig.sup.peer().get(), Some(ip(11)));
    assert_eq!(rig.io.sink.count(|e| matches!(e, AppEvent::PeerDiscovered(_))), 2);

    rig.run(5_000, 100);
    assert_eq!(rig.io.net.telemetry_destinations().last(), Some(&SocketAddr::new(ip(11), 21071)));
}

// ── Memory ────────────────────────────────────────────────────

#[test]
fn idle_reclaim_runs_after_quiet_period() {
    let mut rig = booted();
    rig.run(9_900, 100);
    assert_eq!(rig.io.memory.reclaims, 0);
    rig.run(200, 100);
    assert_eq!(rig.io.memory.reclaims, 1);
}

#[test]
fn low_memory_never_reclaims_while_lit() {
    let mut rig = booted();
    rig.io.memory.free = Some(1_000);
    rig.step(10);
    let before = rig.io.memory.reclaims;
    assert!(before > 0);

    rig.io.net.push_lighting(RED);
    rig.step(10);
    rig.step(10);
    assert_eq!(rig.io.memory.reclaims, before);
}
