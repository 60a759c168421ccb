//! smsfwd daemon entry point
//!
//! Wires configuration, the mmcli bus backend, and the event reactor
//! together, then runs until SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use smsfwd::bus::event_channel;
use smsfwd::config::Config;
use smsfwd::identity::InstanceSet;
use smsfwd::mmcli::{MmcliBus, MmcliConfig};
use smsfwd::reactor::Reactor;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SMS forwarding daemon for ModemManager-managed modems
#[derive(Parser)]
#[command(name = "smsfwd")]
#[command(about = "Forward inbound SMS to mail/command sinks, reject voice calls")]
struct Cli {
    /// Config file path (default: $SMSFWD_CONFIG, ./smsfwd.yaml, then
    /// ~/.config/smsfwd/smsfwd.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// mmcli binary used to talk to ModemManager
    #[arg(long, default_value = "mmcli")]
    mmcli: PathBuf,

    /// Service/modem/store poll interval in seconds
    #[arg(long, default_value = "2")]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = Config::resolve_path(cli.config.as_deref())?;
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(
        config = %config_path.display(),
        instances = config.instances.len(),
        "smsfwd starting"
    );

    let instances = InstanceSet::from_config(&config.instances)?;

    let (tx, rx) = event_channel();
    let bus = MmcliBus::spawn(
        MmcliConfig {
            mmcli: cli.mmcli,
            poll_interval: Duration::from_secs(cli.poll_interval),
        },
        tx,
    );

    let reactor = Reactor::new(instances, bus);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = reactor.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
        _ = sigterm.recv() => {
            info!("terminated, shutting down");
        }
    }

    Ok(())
}
