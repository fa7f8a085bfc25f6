//! Binary entry point for airtrack.
//!
//! Runs the monitor against a live monitor-mode device or a capture file and
//! publishes presence events to TCP subscribers until interrupted.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use airtrack::capture::{FileSource, FrameSource, LiveSource};
use airtrack::observability;
use airtrack::publish::{Endpoint, EventPublisher};
use airtrack::{LifecycleController, MonitorConfig, ShutdownReason};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// airtrack - passive Wi-Fi presence monitor.
#[derive(Parser)]
#[command(name = "airtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "AIRTRACK_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Seconds between eviction passes.
    #[arg(short = 'p', long, global = true)]
    eviction_period: Option<u64>,

    /// Idle eviction passes an entity survives.
    #[arg(short = 'a', long, global = true)]
    max_age: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

/// Frame sources.
#[derive(Subcommand)]
enum Commands {
    /// Capture from a monitor-mode wireless device.
    Live {
        /// Device name, e.g. wlan0mon.
        device: String,

        /// Address subscribers connect to, e.g. tcp://0.0.0.0:5556.
        report: String,
    },

    /// Replay a pcap or pcapng capture file.
    Replay {
        /// Capture file with radiotap link type.
        file: PathBuf,

        /// Address subscribers connect to, e.g. 127.0.0.1:*.
        report: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init_from_config(&config, cli.verbose) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let code = match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    };
    observability.shutdown();
    code
}

/// Loads the config file and applies command-line overrides.
fn load_config(cli: &Cli) -> airtrack::Result<MonitorConfig> {
    let mut config = MonitorConfig::load(cli.config.as_deref())?;
    if let Some(secs) = cli.eviction_period {
        config = config.with_eviction_period(Duration::from_secs(secs));
    }
    if let Some(max_age) = cli.max_age {
        config = config.with_max_age(max_age);
    }
    config.validate()?;
    Ok(config)
}

/// Opens the source, binds the publisher and runs until shutdown.
fn run(command: Commands, config: MonitorConfig) -> airtrack::Result<ExitCode> {
    let (source, report): (Box<dyn FrameSource>, String) = match command {
        Commands::Live { device, report } => (
            Box::new(LiveSource::open(&device, config.read_timeout)?),
            report,
        ),
        Commands::Replay { file, report } => (Box::new(FileSource::open(&file)?), report),
    };

    let endpoint = Endpoint::parse(&report)?;
    let publisher = EventPublisher::bind(&endpoint, config.publisher_capacity)?;
    eprintln!("publishing events on tcp://{}", publisher.local_addr());

    let controller = LifecycleController::new(config, Arc::new(publisher))?;
    let trigger = controller.trigger();
    ctrlc::set_handler(move || {
        trigger.request(ShutdownReason::Signal);
    })
    .map_err(|e| airtrack::Error::StartupFailure {
        component: "signal handler",
        cause: e.to_string(),
    })?;

    controller.start(source)?;
    let Some(summary) = controller.wait() else {
        return Ok(ExitCode::FAILURE);
    };

    eprintln!("{summary}");
    Ok(ExitCode::from(summary.exit_code()))
}
