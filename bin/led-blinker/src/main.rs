//! ---
//! blinker_section: "07-binary"
//! blinker_subsection: "binary"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Binary entrypoint for the LedBlinker deployment."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use blinker_common::config::AppConfig;
use blinker_common::logging::init_tracing;
use blinker_deployment::Deployment;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "LedBlinker deployment",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(short = 'a', long, value_name = "HOST", help = "Ground interface host")]
    address: Option<String>,

    #[arg(short = 'p', long, value_name = "PORT", help = "Ground interface port")]
    port: Option<u16>,

    #[arg(long, value_name = "MS", help = "Synthetic clock interval in milliseconds")]
    interval_ms: Option<u64>,

    #[arg(long, value_name = "SECS", help = "Tear down after this many seconds")]
    run_for_secs: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(address) = &self.address {
            config.comm.host = Some(address.clone());
        }
        if let Some(port) = self.port {
            config.comm.port = port;
        }
        if let Some(interval) = self.interval_ms {
            config.cycle.interval = Duration::from_millis(interval);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/led-blinker.toml"));

    let loaded = AppConfig::load_or_default(&candidates)?;
    let mut config = loaded.config;
    cli.apply(&mut config);
    config.validate().context("invalid command line overrides")?;
    init_tracing("led-blinker", &config.logging)?;
    info!(
        config_path = ?loaded.source,
        deployment = %config.deployment.name,
        interval_ms = config.cycle.interval.as_millis() as u64,
        "configuration loaded"
    );

    let mut deployment = Deployment::assemble(&config)?;
    let report = deployment.bring_up()?;
    for notice in &report.notices {
        info!(%notice, "bring-up notice");
    }

    if let Err(err) = deployment.start_clock() {
        error!(error = %err, "unable to start synthetic clock");
        let teardown = deployment.tear_down();
        if !teardown.is_clean() {
            warn!(failures = teardown.failures.len(), "teardown reported failures");
        }
        return Err(err.into());
    }

    match cli.run_for_secs {
        Some(secs) => {
            tokio::select! {
                result = signal::ctrl_c() => result.context("waiting for ctrl-c")?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "run duration elapsed");
                }
            }
        }
        None => signal::ctrl_c().await.context("waiting for ctrl-c")?,
    }

    info!("shutting down");
    let teardown = deployment.tear_down();
    info!(
        components_stopped = teardown.components_stopped,
        threads_joined = teardown.threads_joined,
        bytes_released = teardown.bytes_released,
        "teardown complete"
    );
    if !teardown.is_clean() {
        for failure in &teardown.failures {
            error!(%failure, "teardown failure");
        }
        bail!("teardown reported {} failure(s)", teardown.failures.len());
    }
    Ok(())
}
