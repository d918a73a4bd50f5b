use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beaconbridge::{Bridge, BridgeConfig, InfluxStorage, ReplayScanner, ScanReport, Storage};

/// Forward BLE sensor advertisements into InfluxDB
#[derive(Debug, Parser)]
#[command(name = "beaconbridge", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "BEACONBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Hostname of the InfluxDB HTTP API
    #[arg(long, env = "BEACONBRIDGE_HOST")]
    host: Option<String>,

    /// Port of the InfluxDB HTTP API
    #[arg(long, env = "BEACONBRIDGE_PORT")]
    port: Option<u16>,

    #[arg(long, env = "BEACONBRIDGE_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "BEACONBRIDGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database readings are written into
    #[arg(long, env = "BEACONBRIDGE_DBNAME")]
    dbname: Option<String>,

    /// Replay a recorded capture instead of scanning the radio
    #[arg(long)]
    replay: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(host) = &self.host {
            config.storage.host = host.clone();
        }
        if let Some(port) = self.port {
            config.storage.port = port;
        }
        if let Some(username) = &self.username {
            config.storage.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.storage.password = password.clone();
        }
        if let Some(dbname) = &self.dbname {
            config.storage.database = dbname.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    let storage = InfluxStorage::new(&config.storage);
    let bridge = Bridge::prepare(storage, config)
        .await
        .context("preparing storage")?;

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_termination(cancel.clone()));

    let report = run(bridge, cli.replay, cancel).await?;
    info!(
        reason = ?report.reason,
        readings = report.scan.readings,
        points_written = report.writer.points_written,
        points_dropped = report.writer.points_dropped,
        "Bridge stopped"
    );
    Ok(())
}

async fn run<S: Storage>(
    bridge: Bridge<S>,
    replay: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<ScanReport> {
    if let Some(path) = replay {
        let scanner = ReplayScanner::open(&path)?;
        return Ok(bridge.run(scanner, cancel).await?);
    }

    #[cfg(feature = "ble")]
    {
        let scanner = beaconbridge::BleScanner::new().await?;
        Ok(bridge.run(scanner, cancel).await?)
    }

    #[cfg(not(feature = "ble"))]
    {
        let _ = (bridge, cancel);
        anyhow::bail!("built without the `ble` feature; pass --replay <capture> or rebuild with --features ble")
    }
}

/// Cancel on Ctrl-C or SIGTERM.
async fn wait_for_termination(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Termination requested");
    cancel.cancel();
}
