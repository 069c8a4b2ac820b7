//! `alarmstream`: stream alarms from the configured cameras to the log until Ctrl-C.

mod settings;

use alarmstream::prelude::*;
use alarmstream::{HttpConnector, RawSocketConnector};
use clap::Parser;
use settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "alarmstream", version, about)]
struct Args {
    /// Settings file (YAML, or JSON by extension). Defaults to the first `config.yaml`,
    /// `config.yml` or `config.json` found in `.` or `./config/`.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level and print the loaded configuration.
    #[arg(short, long)]
    debug: bool,

    /// Accept self-signed camera certificates.
    #[arg(long)]
    insecure: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "alarmstream=debug" } else { "alarmstream=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let path = settings::locate(args.config.as_deref(), Path::new("."))?;
    let mut settings = Settings::load(&path)?;
    settings.apply_env(|name| std::env::var(name).ok())?;

    let debug = args.debug || settings.debug;
    init_tracing(debug);
    info!(target: "alarmstream::cli", config = %path.display(), "settings loaded");

    let disabled = settings.disabled_cams();
    if disabled > 0 {
        warn!(
            target: "alarmstream::cli",
            cams = disabled,
            "hikvision.enabled is off, skipping cams"
        );
    }
    let cameras = settings.into_cameras();
    if debug {
        // CameraConfig's Debug output hides passwords
        for camera in &cameras {
            info!(target: "alarmstream::cli", ?camera, "configured camera");
        }
    }

    let registry = CameraRegistry::new(cameras)?;
    if registry.is_empty() {
        warn!(target: "alarmstream::cli", "no cameras configured, nothing to do");
        return Ok(());
    }

    let http = HttpConnector::builder().accept_invalid_certs(args.insecure).build()?;
    let connector = CameraConnector::new(http, RawSocketConnector::new());
    let pool = SupervisorPool::spawn(
        &registry,
        Arc::new(connector),
        Dispatcher::new(LogSink),
        SupervisorConfig::default(),
    );
    info!(target: "alarmstream::cli", cameras = registry.len(), "started");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "alarmstream::cli", error = %err, "cannot listen for ctrl-c, shutting down");
    }

    for (camera, exit) in pool.shutdown().await {
        info!(target: "alarmstream::cli", %camera, ?exit, "camera stopped");
    }
    Ok(())
}
