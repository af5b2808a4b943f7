// src/main.rs
//! Ride Tracker - trip distance and fuel mileage from live GPS

use anyhow::Context;
use clap::{Parser, Subcommand};
use ride_tracker::{
    advice::GeminiAdvisor,
    coach::Sender,
    config::TrackerConfig,
    mileage::mileage_kmpl,
    monitor::{list_serial_ports, RideMonitor, RideSource},
};
use std::{fs::OpenOptions, path::PathBuf, sync::Mutex, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ride-tracker", version, about = "Trip distance and fuel mileage tracker for two-wheelers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track a ride live on the terminal dashboard
    Track {
        /// Use a serial NMEA receiver instead of the configured source
        #[arg(long)]
        serial: Option<String>,
        #[arg(long, default_value_t = 9600)]
        baudrate: u32,
        /// Use gpsd at host:port instead of the configured source
        #[arg(long, value_name = "HOST:PORT")]
        gpsd: Option<String>,
    },
    /// Play back a recorded ride
    Replay {
        /// JSON array of {latitude, longitude, speed_mps}
        file: PathBuf,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Ask the coach for advice when the ride ends
        #[arg(long)]
        coach: bool,
        /// Show the dashboard instead of printing a summary
        #[arg(long)]
        dashboard: bool,
    },
    /// Compute fuel mileage for a distance and the petrol it took
    Mileage {
        #[arg(long)]
        distance: f64,
        #[arg(long)]
        litres: f64,
    },
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetGpsd {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 2947)]
        port: u16,
    },
    SetSerial {
        port: String,
        #[arg(long, default_value_t = 9600)]
        baudrate: u32,
    },
    SetSource {
        /// "gpsd" or "serial"
        source_type: String,
    },
    /// List available serial ports
    Ports,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = TrackerConfig::load().unwrap_or_default();

    match cli.command {
        Command::Track { serial, baudrate, gpsd } => {
            init_logging(true)?;
            let source = match (serial, gpsd) {
                (Some(port), _) => RideSource::Serial { port, baudrate },
                (None, Some(address)) => parse_gpsd_address(&address)?,
                (None, None) => config.live_source()?,
            };
            run_dashboard(&source, &config).await?;
        }
        Command::Replay { file, interval_ms, coach, dashboard } => {
            init_logging(dashboard)?;
            let source = RideSource::Replay {
                path: file,
                interval: Duration::from_millis(interval_ms),
            };
            if dashboard {
                run_dashboard(&source, &config).await?;
            } else {
                run_replay(&source, &config, coach).await?;
            }
        }
        Command::Mileage { distance, litres } => {
            let kmpl = mileage_kmpl(distance, litres)?;
            println!("Your bike's average: {:.2} km/l", kmpl);
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                    println!("(from {})", TrackerConfig::get_config_path()?.display());
                    return Ok(());
                }
                ConfigAction::Ports => {
                    list_serial_ports()?;
                    return Ok(());
                }
                ConfigAction::SetGpsd { host, port } => config.update_gpsd(host, port),
                ConfigAction::SetSerial { port, baudrate } => config.update_serial(port, baudrate),
                ConfigAction::SetSource { source_type } => config.update_source(&source_type),
            }
            config.live_source().context("refusing to save an unusable source")?;
            config.save()?;
            println!("Saved {}", TrackerConfig::get_config_path()?.display());
        }
    }

    Ok(())
}

/// Log to stderr, or to a file while the dashboard owns the screen
fn init_logging(to_file: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into());

    if to_file {
        let dir = TrackerConfig::config_dir()?;
        std::fs::create_dir_all(&dir).context("creating log directory")?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("ride-tracker.log"))
            .context("opening log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn parse_gpsd_address(address: &str) -> anyhow::Result<RideSource> {
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().context("invalid gpsd port")?),
        None => (address, 2947),
    };
    Ok(RideSource::Gpsd {
        host: host.to_string(),
        port,
    })
}

async fn run_dashboard(source: &RideSource, config: &TrackerConfig) -> anyhow::Result<()> {
    let advisor = GeminiAdvisor::from_config(&config.advice)?;
    let mut monitor = RideMonitor::new(source, config, advisor)
        .with_context(|| format!("opening {}", source.describe()))?;
    monitor.run_dashboard().await?;
    Ok(())
}

async fn run_replay(source: &RideSource, config: &TrackerConfig, coach: bool) -> anyhow::Result<()> {
    let advisor = GeminiAdvisor::from_config(&config.advice)?;
    let mut monitor = RideMonitor::new(source, config, advisor)
        .with_context(|| format!("opening {}", source.describe()))?;

    println!("Replaying {}...", source.describe());
    let report = monitor.run_headless(coach).await?;

    println!("Fixes:    {}", report.fixes);
    println!("Distance: {:.2} km", report.distance_km);
    if let Some(fault) = report.ended_by {
        println!("Ended:    {}", fault);
    }

    if coach {
        println!();
        for message in &report.messages {
            let who = match message.sender {
                Sender::User => "You",
                Sender::Coach => "Coach",
            };
            println!("{}: {}", who, message.text);
        }
    }

    Ok(())
}
