//! `rsc` binary: wire the workers, run the supervisor loop.

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};

use rsc::channel::Slot;
use rsc::config::{ConfigKind, ConfigStore, ConfigValue};
use rsc::supervisor::Supervisor;
use rsc::telemetry::RotationPlot;
use rsc::workers::{names, ControlLauncher, SensorLauncher, ViewLauncher};
use rsc::{Error, Result};

/// Supervisor main-loop poll interval
const MAIN_POLL: Duration = Duration::from_millis(10);
/// File the debug rotation plot is rendered to
const PLOT_PATH: &str = "rsc-rotation.svg";

#[derive(Parser)]
#[command(name = "rsc", version, about = "Rotating stage controller")]
struct Args {
    /// Enable debug telemetry and the live rotation plot
    #[arg(short, long)]
    debug: bool,
    /// Replace the optical sensor and the Modbus drive with in-process
    /// simulators
    #[arg(short, long)]
    testing: bool,
    /// Path to the INI configuration file
    #[arg(short, long, default_value = "rsc.ini")]
    config: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "stage controller failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<ConfigStore> {
    let mut config = ConfigStore::new();
    if Path::new(&args.config).exists() {
        config.load(&args.config)?;
        info!(path = %args.config, "configuration loaded");
    } else if args.config != "rsc.ini" {
        return Err(Error::Config(format!(
            "config file not found: {}",
            args.config
        )));
    }
    config.set("default", "debug", if args.debug { "true" } else { "false" });
    config.set(
        "default",
        "testing",
        if args.testing { "true" } else { "false" },
    );
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let max_frequency = match config.lookup("motor", "max_frequency", ConfigKind::Float)? {
        Some(ConfigValue::Float(v)) => v,
        _ => 40.0,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, shutdown.clone())?;
    signal_hook::flag::register(SIGTERM, shutdown.clone())?;

    let sensor_feed = Slot::new();
    let commands = Slot::new();
    let mut supervisor = Supervisor::new(config);
    supervisor.register(Box::new(SensorLauncher::new(sensor_feed.clone())), &[]);
    supervisor.register(Box::new(ViewLauncher::new(commands.clone())), &[]);
    supervisor.register(
        Box::new(ControlLauncher::new(sensor_feed, commands)),
        &[names::SENSOR, names::VIEW],
    );

    if let Err(e) = supervisor.start_all() {
        error!(error = %e, "failed to initialize");
        supervisor.stop_all();
        return Err(e);
    }
    info!(testing = args.testing, "stage controller running");

    let mut plot = args
        .debug
        .then(|| RotationPlot::new(PLOT_PATH, max_frequency));
    if plot.is_some() {
        info!(path = PLOT_PATH, "rotation plot enabled");
    }

    let result = loop {
        if shutdown.load(Ordering::Relaxed) {
            break Ok(());
        }
        if let Err(e) = supervisor.poll(&mut |frame| {
            if let Some(plot) = plot.as_mut() {
                plot.push(frame);
            }
        }) {
            break Err(e);
        }
        thread::sleep(MAIN_POLL);
    };

    info!("shutting down");
    supervisor.stop_all();
    result
}
