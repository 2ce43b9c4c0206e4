//! Stage Kit bridge: controller entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UdpNet   HostLink/WifiLink  LoggingStageKit  SystemMemory     │
//! │  (NetPort)   (LinkPort)      (StageKitPort)   (MemoryPort)     │
//! │  Watchdog    LogEventSink   MonotonicClock                     │
//! │  (WatchdogPort) (EventSink)                                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Supervisor (pure logic)                   │    │
//! │  │  tracker · drain · safety · intervals · peer cache     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

#[cfg(not(feature = "espidf"))]
use stagekit_bridge::adapters::link::HostLink;
#[cfg(feature = "espidf")]
use stagekit_bridge::adapters::wifi::WifiLink;
use stagekit_bridge::adapters::log_sink::LogEventSink;
use stagekit_bridge::adapters::memory::SystemMemory;
use stagekit_bridge::adapters::stagekit::LoggingStageKit;
use stagekit_bridge::adapters::time::MonotonicClock;
use stagekit_bridge::adapters::udp::UdpNet;
use stagekit_bridge::adapters::device_id;
use stagekit_bridge::config::BridgeConfig;
use stagekit_bridge::drivers::{StarvationAction, Watchdog};
use stagekit_bridge::supervisor::{BridgeIo, Supervisor};

// ── Arguments ─────────────────────────────────────────────────

#[cfg(not(feature = "espidf"))]
#[derive(clap::Parser, Debug)]
#[command(name = "stagekit-bridge", version, about = "Drive a Stage Kit from the RB3E event stream")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Override the RB3E event port.
    #[arg(long)]
    event_port: Option<u16>,

    /// Override the telemetry / discovery port.
    #[arg(long)]
    status_port: Option<u16>,

    /// Treat the link as up only while a route to this address exists.
    #[arg(long)]
    route_to: Option<std::net::SocketAddr>,

    /// Exit after this many seconds (turning the rig off first).
    #[arg(long)]
    run_for_secs: Option<u64>,
}

#[cfg(not(feature = "espidf"))]
type Link = HostLink;
#[cfg(feature = "espidf")]
type Link = WifiLink;

struct Startup {
    config: BridgeConfig,
    link: Link,
    run_for: Option<Duration>,
}

#[cfg(not(feature = "espidf"))]
fn startup() -> Result<Startup> {
    use clap::Parser;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(port) = args.event_port {
        config.event_port = port;
    }
    if let Some(port) = args.status_port {
        config.status_port = port;
    }
    Ok(Startup {
        config,
        link: args.route_to.map_or_else(HostLink::always_up, HostLink::routed_to),
        run_for: args.run_for_secs.map(Duration::from_secs),
    })
}

#[cfg(feature = "espidf")]
fn startup() -> Result<Startup> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use stagekit_bridge::adapters::wifi::WifiCredentials;

    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    // Credentials are baked in at build time.
    let config = BridgeConfig {
        wifi_ssid: option_env!("STAGEKIT_WIFI_SSID").map(str::to_owned),
        wifi_password: option_env!("STAGEKIT_WIFI_PASSWORD").unwrap_or_default().to_owned(),
        ..BridgeConfig::default()
    };
    let credentials = WifiCredentials::new(config.wifi_ssid.as_deref().unwrap_or_default(), &config.wifi_password)
        .map_err(stagekit_bridge::Error::from)
        .context("WiFi credentials (set STAGEKIT_WIFI_SSID / STAGEKIT_WIFI_PASSWORD)")?;

    let peripherals = Peripherals::take()?;
    let link = WifiLink::new(
        peripherals.modem,
        EspSystemEventLoop::take()?,
        EspDefaultNvsPartition::take().ok(),
        credentials,
    )
    .map_err(stagekit_bridge::Error::from)
    .context("starting WiFi station")?;

    Ok(Startup {
        config,
        link,
        run_for: None,
    })
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    let Startup { config, link, run_for } = startup()?;
    config.validate().context("invalid configuration")?;

    info!("╔══════════════════════════════════════╗");
    info!("║  StageKit bridge v{:<19}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let identity = device_id::identity(config.device_id.as_deref(), config.device_name.as_deref());
    info!("Device ID: {} ({})", identity.id, identity.name);

    let clock = MonotonicClock::new();
    let mut io = BridgeIo {
        link,
        net: UdpNet::new(config.bind_addr, config.event_port, config.status_port),
        stagekit: LoggingStageKit::new(),
        watchdog: Watchdog::new(config.watchdog_timeout_ms, StarvationAction::Restart),
        memory: SystemMemory::new(),
        sink: LogEventSink::new(),
    };

    let mut supervisor = Supervisor::new(&config, identity, clock.now_ms());
    supervisor.start(&mut io).context("binding event/status ports")?;

    let started = Instant::now();
    loop {
        let outcome = supervisor.tick(clock.now_ms(), &mut io);
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        std::thread::sleep(outcome.delay);
    }

    supervisor.shutdown(&mut io);
    info!("Sent {} Stage Kit commands", io.stagekit.sent());
    Ok(())
}
