//! Launchpad GW
//!
//! Gateway to drive Home Assistant from a Novation Launchpad grid controller.

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchpad_gw::config::AppConfig;
use launchpad_gw::device::{launchpad, Device, LaunchpadDevice, NullDevice, RotatedDevice};
use launchpad_gw::remote::HomeAssistantClient;
use launchpad_gw::runtime::{Controller, RunOutcome};

/// Exit code telling the supervisor to start us again
const RESTART_EXIT_CODE: u8 = 3;

/// Launchpad GW - drive Home Assistant from a Novation Launchpad
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of the terminal
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Run without hardware
    #[arg(long)]
    mock_device: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref(), args.log_json)?;

    info!("Starting Launchpad GW v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config).await?;

    if args.list_ports {
        launchpad::list_ports_formatted(&config.device.port_name);
        return Ok(ExitCode::SUCCESS);
    }

    if args.check_config {
        print_config_summary(&args.config, &config);
        return Ok(ExitCode::SUCCESS);
    }

    let token = config
        .home_assistant
        .token
        .clone()
        .context("No Home Assistant token: set HA_TOKEN or home_assistant.token")?;
    let client = Arc::new(HomeAssistantClient::from_config(&config.home_assistant, token));
    info!("Home Assistant at {}", client.url());

    let config = Arc::new(config);
    let exit = loop {
        let device = connect_device(&config, args.mock_device).await?;
        let controller = Controller::new(config.clone(), device, client.clone());

        match controller.run(shutdown_signal()).await? {
            RunOutcome::Shutdown => break ExitCode::SUCCESS,
            RunOutcome::RestartRequested => {
                info!("Restart requested, exiting with code {}", RESTART_EXIT_CODE);
                break ExitCode::from(RESTART_EXIT_CODE);
            }
            RunOutcome::Disconnected => warn!("Device lost, reconnecting"),
        }
    };

    client.close().await;
    info!("Launchpad GW shutdown complete");
    Ok(exit)
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        AppConfig::load(path).await
    } else {
        warn!("{} not found, using the built-in mapping", path.display());
        let mut config = AppConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }
}

/// Open the device, retrying with exponential backoff
async fn connect_device(config: &AppConfig, mock: bool) -> Result<Arc<dyn Device>> {
    let inner: Arc<dyn Device> = if mock {
        Arc::new(NullDevice::new())
    } else {
        Arc::new(LaunchpadDevice::new(config.device.port_name.clone()))
    };
    let device: Arc<dyn Device> = Arc::new(RotatedDevice::new(inner, config.device.rotation));

    let attempts = config.device.max_connect_attempts.max(1);
    let max_delay = Duration::from_millis(config.device.max_connect_retry_ms);
    let mut delay = Duration::from_millis(config.device.connect_retry_ms);

    for attempt in 1..=attempts {
        if device.open() {
            info!("Connected to {}", device.name());
            return Ok(device);
        }
        warn!(
            "Could not open {} (attempt {}/{}), retrying in {:?}",
            device.name(),
            attempt,
            attempts,
            delay
        );
        if attempt < attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    bail!(
        "Could not open {} after {} attempts",
        config.device.port_name,
        attempts
    )
}

fn init_logging(level: &str, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (writer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            (writer, Some(guard))
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (writer, Some(guard))
        }
    };
    let ansi = log_file.is_none();

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init()?;
    }

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_config_summary(path: &Path, config: &AppConfig) {
    println!("\n{}", "=== Configuration ===".bold().cyan());
    println!("  File: {}", path.display().to_string().bright_white());
    println!("  Home Assistant: {}", config.home_assistant.websocket_url().green());
    println!(
        "  Token: {}",
        if config.home_assistant.token.is_some() {
            "set".green()
        } else {
            "missing".red()
        }
    );
    println!(
        "  Device: {} (rotation {}°)",
        config.device.port_name.yellow(),
        config.device.rotation.degrees()
    );
    println!("  Mapped pads: {}", config.buttons.len().to_string().green());
    println!(
        "  Color pads: {}, brightness pads: {}",
        config.adjustment.color_enabled.len(),
        config.adjustment.brightness_enabled.len()
    );
    println!("  Ambient lights: {}", config.ambient.entities.join(", "));
    println!("\n{}", "Configuration is valid".green().bold());
}
