// src/main.rs
//! GPS Telemetry - vehicle GPS logger with geofence alerts

use anyhow::Context;
use clap::{Parser, Subcommand};
use gps_telemetry::{cellular, config::LoggerConfig, monitor};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gps-telemetry", version, about = "Vehicle GPS telemetry logger")]
struct Cli {
    /// Config file (defaults to ~/.config/gps-telemetry/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device of the GPS receiver
    #[arg(long, global = true)]
    device: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log GPS fixes and geofence events (default)
    Run,
    /// Record LTE signal metadata from the modem
    Cellular,
    /// List available serial ports
    Ports,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = LoggerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.update_serial(cli.device, cli.baud);
    config.update_database(cli.database);

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    config.validate().context("Invalid configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            log::info!("Starting GPS telemetry logger");
            monitor::run(&config).await.context("GPS logger failed")?;
        }
        Commands::Cellular => {
            cellular::run_cellular_collector(&config)
                .await
                .context("Cellular collector failed")?;
        }
        Commands::Ports => {
            monitor::list_serial_ports()?;
        }
    }

    Ok(())
}
