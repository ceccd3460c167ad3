//! Relay spawn utilities.

use crate::{
    clients::{DynBtcData, DynLedger, DynProof, EsploraClient, LedgerClient, ProofClient},
    config::RelayConfig,
    metrics,
    paymaster::Paymaster,
    settlement::{SettlementHandle, SettlementQueue},
    signers::{DynSigner, RemoteSigner},
    storage::RelayStorage,
    unlocker::Unlocker,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tracing::info;

/// Context returned once the relay components are built.
#[derive(Debug)]
pub struct RelayHandle {
    /// Storage of the relay.
    pub storage: RelayStorage,
    /// Fee-cell allocator.
    pub paymaster: Arc<Paymaster>,
    /// Settlement queue.
    pub queue: Arc<SettlementQueue>,
    /// Time-lock unlocker.
    pub unlocker: Arc<Unlocker>,
}

impl RelayHandle {
    /// Starts the settlement worker pool and the periodic unlock loop.
    pub fn start(&self) -> RunningRelay {
        RunningRelay {
            workers: Arc::clone(&self.queue).start(),
            unlocker: Arc::clone(&self.unlocker).spawn(),
        }
    }
}

/// Background work of a started relay.
#[derive(Debug)]
pub struct RunningRelay {
    /// Settlement worker pool handle.
    pub workers: SettlementHandle,
    /// Unlock loop task.
    pub unlocker: JoinHandle<()>,
}

impl RunningRelay {
    /// Stops the unlock loop and drains the settlement workers.
    pub async fn stop(self) {
        self.unlocker.abort();
        self.workers.close().await;
    }
}

/// Builds every relay component from the configuration without starting any
/// background work.
pub async fn build(config: &RelayConfig) -> eyre::Result<RelayHandle> {
    // construct db
    let storage = if let Some(db_url) = &config.database_url {
        info!("Using PostgreSQL as storage.");
        let pool = PgPool::connect(db_url).await?;
        sqlx::migrate!().run(&pool).await?;

        RelayStorage::pg(pool)
    } else {
        info!("Using in-memory storage.");
        RelayStorage::in_memory()
    };

    // setup metrics exporter
    metrics::serve_exporter(SocketAddr::new(config.server.address, config.server.metrics_port))?;

    // construct collaborators
    let btc: DynBtcData = Arc::new(EsploraClient::new(
        config.bitcoin.endpoint.clone(),
        config.bitcoin.network.clone(),
    ));
    let ledger: DynLedger = Arc::new(LedgerClient::new(
        config.ledger.rpc_url.clone(),
        config.ledger.indexer_url.clone(),
    ));
    let proof: DynProof = Arc::new(ProofClient::new(config.proof.endpoint.clone()));
    let signer: DynSigner = Arc::new(RemoteSigner::new(config.signer.endpoint.clone()));

    let paymaster = Arc::new(Paymaster::new(
        storage.clone(),
        Arc::clone(&ledger),
        Arc::clone(&signer),
        config.paymaster.clone(),
    ));

    let queue = Arc::new(SettlementQueue::new(
        storage.clone(),
        Arc::clone(&btc),
        Arc::clone(&ledger),
        Arc::clone(&paymaster),
        config.queue.clone(),
    ));

    let unlocker = Arc::new(Unlocker::new(
        btc,
        ledger,
        proof,
        signer,
        config.unlocker.clone(),
        config.assets.clone(),
        &config.paymaster,
    ));

    Ok(RelayHandle { storage, paymaster, queue, unlocker })
}
