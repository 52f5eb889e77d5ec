use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{Config, ConfigOverrides};
use crate::devices::gps::{GpsReader, NmeaDecoder, NmeaReplay};
use crate::devices::traits::LocationSource;
use crate::output::{formatter_for, ConsoleSender, DataFormatter, DataSender, FileSender};
use crate::services::GpsService;
use crate::storage::LocationStore;
use crate::ui::LocationView;
use crate::utils::error::GpsError;

#[derive(Debug, Parser)]
#[command(name = "gps_tracker", version, about = "Records GPS fixes and lists the accurate ones")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show locations live until Ctrl-C; Enter starts or stops the GPS service
    Track {
        /// Serial port of the receiver
        #[arg(short, long)]
        port: Option<String>,

        #[arg(short, long)]
        baud: Option<u32>,

        /// console, json or csv
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Decode a captured NMEA log and show its accurate locations
    Replay {
        file: PathBuf,

        #[arg(short, long)]
        format: Option<String>,

        /// Write the view to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List serial ports
    Ports,
    /// Write the default configuration
    InitConfig {
        output: PathBuf,
    },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            log_level: self.log_level.clone(),
            ..ConfigOverrides::default()
        };
        match &self.command {
            Command::Track { port, baud, format } => {
                overrides.serial_port = port.clone();
                overrides.baud_rate = *baud;
                overrides.format = format.clone();
            }
            Command::Replay { format, .. } => {
                overrides.format = format.clone();
            }
            Command::Ports | Command::InitConfig { .. } => {}
        }
        overrides
    }
}

fn formatter(config: &Config) -> Result<Box<dyn DataFormatter>, GpsError> {
    formatter_for(&config.display.format)
        .ok_or_else(|| GpsError::ConfigError(format!("Unknown format: {}", config.display.format)))
}

pub async fn handle_command(command: &Command, config: &Config) -> Result<(), GpsError> {
    match command {
        Command::Track { .. } => track(config).await,
        Command::Replay { file, output, .. } => replay(config, file, output.as_deref()).await,
        Command::Ports => list_ports(),
        Command::InitConfig { output } => {
            Config::default().save_to_file(output)?;
            println!("✅ Default configuration written to {}", output.display());
            Ok(())
        }
    }
}

async fn track(config: &Config) -> Result<(), GpsError> {
    info!("🛰️ Tracking on {} at {} baud", config.gps.serial_port, config.gps.baud_rate);

    let store = LocationStore::shared();
    let service = GpsService::new(&config.gps, Arc::clone(&store));
    let mut view = LocationView::new(Arc::clone(&store), service, formatter(config)?);
    view.add_sender(Box::new(ConsoleSender));

    view.on_start().await?;
    view.start_gps_service().await?;

    // A plain thread, so a pending stdin read never holds up runtime shutdown.
    let (toggle_tx, toggle_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || toggle_tx.send(()).is_err() {
                break;
            }
        }
    });
    println!("⏯️  Press Enter to start or stop GPS, Ctrl-C to quit");

    view.run_with_controls(toggle_rx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("❌ Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await?;

    info!("🛑 Shutting down");
    view.stop_gps_service().await?;
    view.on_stop();
    info!("📊 {} samples recorded this session", store.sample_count());
    Ok(())
}

async fn replay(config: &Config, file: &Path, output: Option<&Path>) -> Result<(), GpsError> {
    let input = File::open(file)
        .map_err(|e| GpsError::ConfigError(format!("Failed to open {}: {}", file.display(), e)))?;

    let store = LocationStore::shared();
    let decoder = NmeaDecoder::new(config.gps.provider.clone(), config.gps.sample_interval_ms);
    let writer = Arc::clone(&store);

    let recorded = tokio::task::spawn_blocking(move || -> Result<usize, GpsError> {
        let mut replay = NmeaReplay::new(BufReader::new(input), decoder);
        let mut recorded = 0;
        replay.read_locations(&AtomicBool::new(true), &mut |sample| {
            writer.insert_location(sample);
            recorded += 1;
            true
        })?;
        Ok(recorded)
    })
    .await??;

    let locations = store.get_locations();
    info!(
        "📼 Replayed {} samples from {}, {} accurate",
        recorded,
        file.display(),
        locations.len()
    );

    let rendered = formatter(config)?.format(&locations);
    let sender: Box<dyn DataSender> = match output {
        Some(path) => Box::new(FileSender::new(path, false)),
        None => Box::new(ConsoleSender),
    };
    sender.send(&rendered).await?;
    if let Some(path) = output {
        println!("✅ Wrote {} locations to {}", locations.len(), path.display());
    }
    Ok(())
}

fn list_ports() -> Result<(), GpsError> {
    let ports = GpsReader::list_ports()?;
    println!("📡 Available Serial Ports:");
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }
    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {} ({})", index + 1, port.port_name, port.description);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "gps_tracker",
            "--log-level",
            "debug",
            "track",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "4800",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(overrides.baud_rate, Some(4800));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert!(overrides.format.is_none());
    }

    #[test]
    fn test_replay_arguments() {
        let cli =
            Cli::try_parse_from(["gps_tracker", "replay", "drive.nmea", "-f", "json"]).unwrap();
        match &cli.command {
            Command::Replay { file, format, output } => {
                assert_eq!(file, &PathBuf::from("drive.nmea"));
                assert_eq!(format.as_deref(), Some("json"));
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_writes_filtered_view() {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("gps_tracker_{}_drive.nmea", std::process::id()));
        let output = dir.join(format!("gps_tracker_{}_drive.csv", std::process::id()));
        std::fs::write(
            &input,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\n\
             $GPGGA,123520,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*4D\n\
             $GPGGA,123521,4807.038,N,01131.000,E,1,08,3.0,545.4,M,46.9,M,,*46\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.display.format = "csv".to_string();
        replay(&config, &input, Some(output.as_path())).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let rows: Vec<&str> = written.lines().skip(1).filter(|l| !l.is_empty()).collect();
        assert_eq!(rows.len(), 2);
        let first: i64 = rows[0].split(',').next().unwrap().parse().unwrap();
        let second: i64 = rows[1].split(',').next().unwrap().parse().unwrap();
        assert_eq!(first - second, 1000);

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }
}
