//! Aggregator over loopback UDP on ephemeral ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stagekit_bridge::app::events::LifecycleEvent;
use stagekit_bridge::config::BridgeConfig;
use stagekit_bridge::desktop::{Aggregator, StageKitControl};
use stagekit_bridge::game::GamePhase;
use stagekit_bridge::protocol::stagekit::SK_LED_GREEN;
use stagekit_bridge::protocol::{encode, EventType, LightingCommand};
use stagekit_bridge::registry::DeviceStatus;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn loopback_config() -> BridgeConfig {
    BridgeConfig {
        bind_addr: LOCALHOST,
        event_port: 0,
        status_port: 0,
        broadcast_addr: Ipv4Addr::LOCALHOST,
        receive_timeout_ms: 50,
        watchdog_timeout_ms: 400,
        ..BridgeConfig::default()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

struct Game {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Game {
    fn new(target: SocketAddr) -> Self {
        Self {
            socket: UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap(),
            target,
        }
    }

    fn send(&self, event: EventType, payload: &[u8]) {
        let datagram = encode(event, payload).unwrap();
        self.socket.send_to(&datagram, self.target).unwrap();
    }
}

type Seen = Arc<Mutex<Vec<(Instant, LifecycleEvent)>>>;

fn recording(agg: &mut Aggregator) -> Seen {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    agg.subscribe(move |ev: &LifecycleEvent| sink.lock().unwrap().push((Instant::now(), ev.clone())));
    seen
}

#[test]
fn tracks_a_song_and_the_latest_lighting_cue() {
    let mut agg = Aggregator::new(loopback_config());
    let seen = recording(&mut agg);
    agg.start().unwrap();
    let (event_addr, _) = agg.local_addrs().unwrap();
    let game = Game::new(event_addr);

    game.send(EventType::Alive, b"RB3E test build\0");
    game.send(EventType::SongName, b"Song");
    game.send(EventType::SongArtist, b"Artist");
    game.send(EventType::SongShortname, b"short");
    game.send(EventType::State, b"1");
    game.send(EventType::StageKit, &LightingCommand::new(0x03, SK_LED_GREEN).to_payload());

    assert!(wait_until(|| seen.lock().unwrap().len() >= 2));
    assert!(wait_until(|| agg.stats().lighting >= 1));

    let events: Vec<_> = seen.lock().unwrap().iter().map(|(_, e)| e.clone()).collect();
    assert!(matches!(&events[0], LifecycleEvent::MetadataReady(s) if s.shortname == "short"));
    assert!(matches!(&events[1], LifecycleEvent::SongStarted(s) if s.artist == "Artist"));

    assert_eq!(agg.game_state().phase, GamePhase::Playing);
    assert_eq!(agg.take_lighting(), Some(LightingCommand::new(0x03, SK_LED_GREEN)));
    assert_eq!(agg.take_lighting(), None);

    let link = agg.game_link();
    assert_eq!(link.address, Some(LOCALHOST));
    assert_eq!(link.build.as_deref(), Some("RB3E test build"));
    assert!(agg.is_game_active());

    game.send(EventType::State, b"0");
    assert!(wait_until(|| seen.lock().unwrap().len() >= 3));
    assert!(matches!(seen.lock().unwrap()[2].1, LifecycleEvent::SongEnded { .. }));

    agg.stop();
    assert!(!agg.is_running());
}

#[test]
fn garbage_is_counted_not_fatal() {
    let mut agg = Aggregator::new(loopback_config());
    agg.start().unwrap();
    let (event_addr, _) = agg.local_addrs().unwrap();
    let game = Game::new(event_addr);

    game.socket.send_to(b"not rb3e", event_addr).unwrap();
    game.send(EventType::State, b"1");

    assert!(wait_until(|| agg.stats().received >= 2));
    assert_eq!(agg.stats().invalid, 1);
    assert!(wait_until(|| agg.game_state().phase == GamePhase::Playing));
}

#[test]
fn telemetry_populates_the_fleet_registry() {
    let mut agg = Aggregator::new(loopback_config());
    agg.start().unwrap();
    let (_, status_addr) = agg.local_addrs().unwrap();

    let controller = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let report = r#"{"id":"24:6f:28:01:ab:cd","name":"StageKit ab:cd","usb_status":"Connected","wifi_signal":-60,"uptime":12.5}"#;
    controller.send_to(report.as_bytes(), status_addr).unwrap();

    assert!(wait_until(|| !agg.devices().is_empty()));
    let devices = agg.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "24:6f:28:01:ab:cd");
    assert_eq!(devices[0].status, DeviceStatus::Online);
    assert!(devices[0].last_telemetry.peripheral_connected());
    assert_eq!(agg.device_address("24:6f:28:01:ab:cd"), Some(LOCALHOST));
}

#[test]
fn manual_all_off_reaches_the_event_port() {
    let mut agg = Aggregator::new(loopback_config());
    agg.start().unwrap();
    let (event_addr, _) = agg.local_addrs().unwrap();

    let control = StageKitControl::new(event_addr.port(), Ipv4Addr::LOCALHOST).unwrap();
    control.all_off(Some(LOCALHOST)).unwrap();

    assert!(wait_until(|| agg.stats().lighting >= 1));
    assert_eq!(agg.take_lighting(), Some(LightingCommand::ALL_OFF));
}

#[test]
fn song_start_is_held_back_by_the_start_delay() {
    let config = BridgeConfig {
        song_start_delay_ms: 300,
        ..loopback_config()
    };
    let mut agg = Aggregator::new(config);
    let seen = recording(&mut agg);
    agg.start().unwrap();
    let (event_addr, _) = agg.local_addrs().unwrap();
    let game = Game::new(event_addr);

    let sent_at = Instant::now();
    game.send(EventType::State, b"1");
    assert!(wait_until(|| !seen.lock().unwrap().is_empty()));

    let (delivered_at, event) = seen.lock().unwrap()[0].clone();
    assert!(matches!(event, LifecycleEvent::SongStarted(_)));
    assert!(delivered_at.duration_since(sent_at) >= Duration::from_millis(300));
}

#[test]
fn idle_receive_threads_keep_their_watchdogs_fed() {
    let mut agg = Aggregator::new(loopback_config());
    agg.start().unwrap();
    // Several watchdog windows with no traffic on either port.
    std::thread::sleep(Duration::from_millis(1_200));
    assert_eq!(agg.stats().watchdog_faults, 0);
    agg.stop();
}

#[test]
fn stop_is_prompt_and_idempotent() {
    let mut agg = Aggregator::new(BridgeConfig {
        receive_timeout_ms: 5_000,
        ..loopback_config()
    });
    agg.start().unwrap();

    let started = Instant::now();
    agg.stop();
    agg.stop();
    // Wake datagrams unblock the receivers long before their timeout.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(agg.local_addrs().is_none());
}
