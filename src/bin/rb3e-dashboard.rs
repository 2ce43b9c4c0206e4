//! RB3E dashboard: aggregator entry point.
//!
//! Listens for the game's event stream and the controllers' telemetry,
//! logs song lifecycle events, and prints a fleet summary periodically.
//! `--all-off` sends a single all-off command and exits.

#[cfg(feature = "espidf")]
fn main() {}

#[cfg(not(feature = "espidf"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(not(feature = "espidf"))]
mod host {
    use std::net::IpAddr;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};
    use clap::Parser;
    use log::info;

    use stagekit_bridge::app::events::LifecycleEvent;
    use stagekit_bridge::config::BridgeConfig;
    use stagekit_bridge::desktop::Aggregator;
    use stagekit_bridge::registry::DeviceStatus;

    #[derive(Parser, Debug)]
    #[command(name = "rb3e-dashboard", version, about = "Track RB3E sessions and Stage Kit controllers")]
    struct Args {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds between fleet summaries.
        #[arg(long, default_value_t = 5)]
        summary_secs: u64,

        /// Exit after this many seconds.
        #[arg(long)]
        run_for_secs: Option<u64>,

        /// Send all-off (to TARGET, or broadcast) and exit.
        #[arg(long, value_name = "TARGET", num_args = 0..=1, default_missing_value = "255.255.255.255")]
        all_off: Option<IpAddr>,
    }

    pub fn run() -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        let args = Args::parse();

        let config = match &args.config {
            Some(path) => BridgeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        config.validate().context("invalid configuration")?;

        let mut aggregator = Aggregator::new(config);

        if let Some(target) = args.all_off {
            let control = aggregator.control()?;
            control.all_off(Some(target)).context("sending all-off")?;
            info!("All-off sent to {}", target);
            return Ok(());
        }

        aggregator.subscribe(|event: &LifecycleEvent| match event {
            LifecycleEvent::SongStarted(song) => info!("▶ song started: {}", song),
            LifecycleEvent::MetadataReady(song) => info!("♪ now playing: {}", song),
            LifecycleEvent::SongEnded { song, elapsed } => {
                info!("■ song ended after {}s: {}", elapsed.as_secs(), song);
            }
        });
        aggregator.start().context("starting aggregator")?;

        let started = Instant::now();
        let summary = Duration::from_secs(args.summary_secs.max(1));
        loop {
            std::thread::sleep(summary);
            print_summary(&aggregator);
            if args
                .run_for_secs
                .is_some_and(|limit| started.elapsed() >= Duration::from_secs(limit))
            {
                break;
            }
        }

        aggregator.stop();
        Ok(())
    }

    fn print_summary(aggregator: &Aggregator) {
        let link = aggregator.game_link();
        let game = match (&link.address, aggregator.is_game_active()) {
            (Some(addr), true) => format!("{} (build {})", addr, link.build.as_deref().unwrap_or("?")),
            (Some(addr), false) => format!("{} (idle)", addr),
            (None, _) => "not seen".to_owned(),
        };
        let state = aggregator.game_state();
        let s = aggregator.stats();
        info!(
            "game: {} | phase {:?} | rx={} lighting={} lifecycle={} invalid={}",
            game, state.phase, s.received, s.lighting, s.lifecycle, s.invalid
        );

        for device in aggregator.devices() {
            let status = match device.status {
                DeviceStatus::Online => "ONLINE",
                DeviceStatus::Stale => "OFFLINE",
            };
            let report = &device.last_telemetry;
            info!(
                "  {:<8} {:<20} {:<16} usb={:<12} rssi={:>4} up={:.0}s",
                status, report.name, device.address, report.usb_status, report.wifi_signal, report.uptime
            );
        }
    }
}
