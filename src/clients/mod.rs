//! Collaborator interfaces.
//!
//! Each external chain-data collaborator gets a narrow trait so concrete
//! implementations are injected rather than duck-typed at call sites. HTTP
//! implementations live in the submodules; tests supply their own mocks.

use crate::{
    error::RelayError,
    types::{Cell, JsonBytes, OutPoint, RawTransaction, Script, H256},
};
use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};

mod btc;
pub use btc::EsploraClient;

mod ledger;
pub use ledger::LedgerClient;

mod proof;
pub use proof::ProofClient;

/// Bitcoin chain tip information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Network name, e.g. `main` or `test`.
    pub chain: String,
    /// Current tip height.
    pub height: u64,
}

/// Confirmation status of a Bitcoin transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtcTxStatus {
    /// Whether the transaction is included in a block.
    pub confirmed: bool,
    /// Height of the including block.
    pub block_height: Option<u64>,
    /// Timestamp of the including block.
    pub block_time: Option<u64>,
}

/// Bitcoin data provider.
#[async_trait]
pub trait BtcDataApi: Debug + Send + Sync {
    /// Returns chain name and tip height.
    async fn chain_info(&self) -> Result<ChainInfo, RelayError>;

    /// Returns the confirmation status of `txid`.
    ///
    /// A transaction unknown to the provider is an error, not an unconfirmed
    /// status; callers treat it as a retryable failure.
    async fn tx_status(&self, txid: &Txid) -> Result<BtcTxStatus, RelayError>;
}

/// Shared handle to a [`BtcDataApi`].
pub type DynBtcData = Arc<dyn BtcDataApi>;

/// Filter for the paginated cell collector.
#[derive(Debug, Clone, Default)]
pub struct CellFilter {
    /// Lock script to match. Args are matched as a prefix, so an empty-args
    /// script matches every cell under the code hash.
    pub lock: Script,
    /// Exact type script to match, if any.
    pub type_script: Option<Script>,
    /// Half-open capacity range `[min, max)` in shannons, if any.
    pub capacity_range: Option<(u64, u64)>,
}

/// One page of collected cells.
#[derive(Debug, Clone)]
pub struct CellPage {
    /// Cells in this page.
    pub cells: Vec<Cell>,
    /// Cursor for the next page; `None` when the scan is exhausted.
    pub cursor: Option<String>,
}

/// Commit status of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTxStatus {
    /// In the tx pool.
    Pending,
    /// Proposed in a block.
    Proposed,
    /// Committed on chain.
    Committed,
    /// Rejected by the node, with the node's reason.
    Rejected(String),
    /// Not known to the node.
    Unknown,
}

/// Ledger RPC + indexer client.
#[async_trait]
pub trait LedgerApi: Debug + Send + Sync {
    /// Collects live cells matching `filter`, paginated.
    async fn collect_cells(
        &self,
        filter: &CellFilter,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<CellPage, RelayError>;

    /// Returns the capacity of the live cell at `out_point`.
    async fn cell_capacity(&self, out_point: &OutPoint) -> Result<u64, RelayError>;

    /// Broadcasts a signed transaction, returning its hash.
    async fn send_transaction(&self, tx: &RawTransaction) -> Result<H256, RelayError>;

    /// Returns the commit status of a transaction.
    async fn transaction_status(&self, hash: &H256) -> Result<LedgerTxStatus, RelayError>;
}

/// Shared handle to a [`LedgerApi`].
pub type DynLedger = Arc<dyn LedgerApi>;

/// Proof material for a Bitcoin transaction, consumed by unlock witnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxProof {
    /// Opaque proof bytes.
    pub proof: JsonBytes,
}

/// Cross-chain proof service.
#[async_trait]
pub trait ProofApi: Debug + Send + Sync {
    /// Fetches the proof for `txid` at the given confirmation depth.
    async fn tx_proof(&self, txid: &Txid, confirmations: u32) -> Result<TxProof, RelayError>;
}

/// Shared handle to a [`ProofApi`].
pub type DynProof = Arc<dyn ProofApi>;
