//! # Relay CLI

use crate::{config::RelayConfig, spawn};
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use tokio::time::Instant;
use tracing::info;
use url::Url;

/// The RGB++ settlement relay sponsors fee cells and finalizes cross-chain
/// transactions once their Bitcoin counterpart is visible.
#[derive(Debug, Parser)]
#[command(author, about = "RGB++ settlement relay", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored in the working
    /// directory under `relay.yaml`.
    #[arg(long, value_name = "CONFIG", env = "RELAY_CONFIG", default_value = "relay.yaml")]
    pub config: PathBuf,
    /// Esplora-compatible Bitcoin data provider endpoint.
    #[arg(long = "btc.endpoint", value_name = "URL")]
    pub btc_endpoint: Option<Url>,
    /// Ledger node JSON-RPC endpoint.
    #[arg(long = "ledger.rpc", value_name = "URL")]
    pub ledger_rpc: Option<Url>,
    /// Database URL for the shared queue store.
    #[arg(long, value_name = "URL", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    /// The port to serve metrics on.
    #[arg(long = "http.metrics-port", value_name = "PORT")]
    pub metrics_port: Option<u16>,
    /// Delay before settlement jobs become visible to workers.
    #[arg(long, value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub process_delay: Option<Duration>,
    /// Maximum processing attempts per settlement job.
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,
    /// Number of settlement workers.
    #[arg(long, value_name = "COUNT")]
    pub concurrency: Option<usize>,
    /// One-shot mode: process due settlement jobs for at most this long, then
    /// drain and exit instead of running the long-lived service.
    ///
    /// Intended for invocations under an external execution-time limit.
    #[arg(long, value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub drain_for: Option<Duration>,
}

impl Args {
    /// Overlays CLI values onto a loaded [`RelayConfig`].
    pub fn merge_relay_config(&self, config: RelayConfig) -> RelayConfig {
        config
            .with_bitcoin_endpoint(self.btc_endpoint.clone())
            .with_ledger_rpc(self.ledger_rpc.clone())
            .with_database_url(self.database_url.clone())
            .with_metrics_port(self.metrics_port)
            .with_process_delay(self.process_delay)
            .with_max_attempts(self.max_attempts)
            .with_concurrency(self.concurrency)
    }

    /// Loads the configuration file, materializing a default one if missing.
    pub fn load_config(&self) -> eyre::Result<RelayConfig> {
        if !self.config.exists() {
            let config = self.merge_relay_config(RelayConfig::default());
            config.save_to_file(&self.config)?;
            return Ok(config);
        }
        Ok(self.merge_relay_config(RelayConfig::load_from_file(&self.config)?))
    }

    /// Runs the relay service.
    pub async fn run(self) -> eyre::Result<()> {
        let config = self.load_config()?;
        let handle = spawn::build(&config).await?;

        if let Some(window) = self.drain_for {
            // Time-boxed invocation: no workers, no unlock loop. Work is
            // processed until the queue is empty or the deadline passes, and
            // the job in flight always drains before we return.
            let processed = handle.queue.drain_until(Instant::now() + window).await?;
            info!(processed, "drain window finished");
            return Ok(());
        }

        let running = handle.start();
        info!("relay started");

        tokio::signal::ctrl_c().await?;
        info!("shutting down; draining in-flight settlement work");
        running.stop().await;

        Ok(())
    }
}

/// Parses a string representing seconds to a [`Duration`].
fn parse_duration_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}
