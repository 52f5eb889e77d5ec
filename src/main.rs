use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use gps_tracker::cli::{handle_command, Cli};
use gps_tracker::Config;

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_ref())
        .context("Failed to load configuration")?;
    config
        .apply_overrides(&cli.overrides())
        .context("Invalid command line settings")?;

    init_logging(&config.display.log_level);
    info!("🛰️  GPS Tracker v{}", gps_tracker::VERSION);

    handle_command(&cli.command, &config).await?;
    Ok(())
}
