//! Pendant console entry point.

mod app;
mod bridge;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pendant_firmware_update::Language;
use tracing_subscriber::EnvFilter;

use config::ConsoleConfig;

#[derive(Parser)]
#[command(name = "pendant-console", version)]
#[command(about = "Firmware update tool for the pendant controller")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device base URL (overrides config file)
    #[arg(short, long)]
    device: Option<String>,

    /// Message language: en or zh (overrides config file)
    #[arg(long)]
    lang: Option<Language>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a firmware image, reboot, and wait for the device
    Flash {
        /// Firmware image file
        image: PathBuf,

        /// Stop after the image is written; do not reboot
        #[arg(long)]
        no_reboot: bool,
    },
    /// Show the firmware version running on the device
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match ConsoleConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            ConsoleConfig::default()
        }
    };
    if let Some(device) = cli.device {
        config.device_url = device;
    }
    if let Some(lang) = cli.lang {
        config.language = lang;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.device_url,
        "starting pendant console"
    );

    match cli.command {
        Command::Flash { image, no_reboot } => app::flash(&config, &image, !no_reboot).await,
        Command::Version => app::show_version(&config).await,
    }
}
