//! hw-timestamper entry point.
//!
//! Opens a raw capture socket on one interface, runs the capture and log
//! workers, and writes the NIC hardware receive timestamp of every frame
//! to a `;`-delimited log until interrupted with Ctrl+C.

mod signals;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use hwts_common::{CaptureConfig, WaitConfig};
use hwts_pipeline::ShutdownToken;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::signals::SignalHandler;

/// Default system-wide configuration file.
const SYSTEM_CONFIG_PATH: &str = "/etc/hw-timestamper/config.toml";

/// hw-timestamper command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "hw-timestamper",
    about = "Record the NIC hardware receive timestamp of every frame on an interface",
    version,
    long_about = None
)]
struct Args {
    /// Network interface to capture on (e.g. enp5s0).
    #[arg(value_name = "INTERFACE")]
    interface: String,

    /// Output log file (overrides config file).
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Idle strategy for both workers: busy, yield, or sleep:<duration>.
    #[arg(long, value_name = "STRATEGY")]
    wait: Option<WaitConfig>,

    /// Leave the interface's promiscuous flag alone.
    #[arg(long)]
    no_promisc: bool,

    /// Clear the promiscuous flag again on shutdown.
    #[arg(long)]
    restore_promisc: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        interface = %args.interface,
        "Starting hw-timestamper"
    );

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        output = %config.output.display(),
        capacity = config.channel_capacity,
        wait = %config.wait.strategy,
        promiscuous = config.capture.promiscuous,
        "Configuration loaded"
    );

    let token = ShutdownToken::new();
    let signals =
        SignalHandler::install(token.clone()).context("Failed to set up signal handler")?;

    run_capture(&args.interface, &config, &token, &signals)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "hw_timestamper={level},hwts_pipeline={level},hwts_net={level},hwts_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `HWTS_CONFIG_PATH` environment variable
/// 3. `/etc/hw-timestamper/config.toml` (system path)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<CaptureConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return CaptureConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("HWTS_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from HWTS_CONFIG_PATH");
            return CaptureConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from HWTS_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "HWTS_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return CaptureConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {system_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(CaptureConfig::default())
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut CaptureConfig, args: &Args) {
    if let Some(output) = &args.output {
        config.output.clone_from(output);
    }
    if let Some(wait) = args.wait {
        config.wait.strategy = wait;
    }
    if args.no_promisc {
        config.capture.promiscuous = false;
    }
    if args.restore_promisc {
        config.capture.restore_promiscuous = true;
    }
}

#[cfg(target_os = "linux")]
fn run_capture(
    interface: &str,
    config: &CaptureConfig,
    token: &ShutdownToken,
    signals: &SignalHandler,
) -> Result<()> {
    use hwts_net::{CaptureSocket, SocketConfig};

    let socket_config =
        SocketConfig::new(interface).with_promiscuous(config.capture.promiscuous);
    let socket = CaptureSocket::open(&socket_config)
        .with_context(|| format!("Failed to open capture socket on {interface}"))?;

    let report = supervisor::run_pipeline(socket, config, token)?;

    info!("Shutting down...");
    let mut socket = report.source;
    if config.capture.restore_promiscuous {
        if let Err(e) = socket.restore_promiscuous() {
            warn!(interface, error = %e, "Failed to restore promiscuous flag");
        }
    }
    drop(socket);

    info!(
        frames = report.stats.frames_received,
        without_timestamp = report.capture.without_timestamp,
        pushed = report.capture.pushed,
        dropped = report.capture.dropped,
        recv_errors = report.capture.recv_errors,
        logged = report.log.records_written,
        write_errors = report.log.write_errors,
        abandoned = report.log.abandoned,
        signals = signals.signal_count(),
        uptime = %humantime::format_duration(report.stats.uptime),
        output = %config.output.display(),
        "Capture complete"
    );

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_capture(
    interface: &str,
    _config: &CaptureConfig,
    _token: &ShutdownToken,
    _signals: &SignalHandler,
) -> Result<()> {
    anyhow::bail!("hardware timestamp capture on {interface} requires Linux")
}
