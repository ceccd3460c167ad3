//! Shared test environment: mock collaborators over the in-memory store.
#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::{hashes::Hash, Txid};
use rgbpp_relay::{
    clients::{
        BtcDataApi, BtcTxStatus, CellFilter, CellPage, ChainInfo, LedgerApi, LedgerTxStatus,
        ProofApi, TxProof,
    },
    config::PaymasterConfig,
    error::RelayError,
    signers::{SignerApi, SignerKey},
    types::{Cell, CellOutput, JsonBytes, OutPoint, RawTransaction, Script, ScriptHashType, H256},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

/// Deterministic txid from a marker byte.
pub fn txid(marker: u8) -> Txid {
    Txid::from_slice(&[marker; 32]).unwrap()
}

/// Deterministic hash from a marker byte.
pub fn h256(marker: u8) -> H256 {
    H256([marker; 32])
}

/// The paymaster lock used across tests.
pub fn paymaster_lock() -> Script {
    Script { code_hash: h256(0x50), hash_type: ScriptHashType::Type, args: JsonBytes(vec![0x01]) }
}

/// Paymaster configuration sized for tests.
pub fn paymaster_config() -> PaymasterConfig {
    PaymasterConfig {
        lock: paymaster_lock(),
        cell_capacity: 1_000,
        preset_count: 4,
        refill_threshold: 0.5,
        tx_fee: 10,
        ..PaymasterConfig::default()
    }
}

/// A pool-sized fee cell owned by the paymaster lock.
pub fn fee_cell(index: u32) -> Cell {
    Cell {
        out_point: OutPoint { tx_hash: h256(0xfe), index },
        output: CellOutput { capacity: 1_000, lock: paymaster_lock(), type_script: None },
        data: JsonBytes::default(),
        block_number: 100,
    }
}

/// Mock Bitcoin data provider with a fixed tip and per-txid statuses.
#[derive(Debug, Default)]
pub struct MockBtc {
    pub tip: AtomicU64,
    statuses: Mutex<HashMap<Txid, BtcTxStatus>>,
    pub status_calls: AtomicU64,
}

impl MockBtc {
    pub fn with_tip(tip: u64) -> Self {
        let this = Self::default();
        this.tip.store(tip, Ordering::Relaxed);
        this
    }

    pub fn insert_status(&self, txid: Txid, status: BtcTxStatus) {
        self.statuses.lock().unwrap().insert(txid, status);
    }

    pub fn confirm(&self, txid: Txid, block_height: u64) {
        self.insert_status(
            txid,
            BtcTxStatus { confirmed: true, block_height: Some(block_height), block_time: Some(0) },
        );
    }
}

#[async_trait]
impl BtcDataApi for MockBtc {
    async fn chain_info(&self) -> Result<ChainInfo, RelayError> {
        Ok(ChainInfo { chain: "test".into(), height: self.tip.load(Ordering::Relaxed) })
    }

    async fn tx_status(&self, txid: &Txid) -> Result<BtcTxStatus, RelayError> {
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        self.statuses.lock().unwrap().get(txid).cloned().ok_or(RelayError::ChainRpc {
            code: 404,
            message: "Transaction not found".into(),
        })
    }
}

/// Mock ledger: an in-memory cell set plus a record of broadcasts.
#[derive(Debug, Default)]
pub struct MockLedger {
    cells: Mutex<Vec<Cell>>,
    pub sent: Mutex<Vec<RawTransaction>>,
    capacities: Mutex<HashMap<String, u64>>,
    send_counter: AtomicU64,
    /// When set, `send_transaction` fails with a node error.
    pub reject_sends: std::sync::atomic::AtomicBool,
}

impl MockLedger {
    pub fn with_cells(cells: Vec<Cell>) -> Self {
        Self { cells: Mutex::new(cells), ..Self::default() }
    }

    pub fn add_cell(&self, cell: Cell) {
        self.cells.lock().unwrap().push(cell);
    }

    /// Registers the capacity reported for an input outpoint.
    pub fn set_capacity(&self, out_point: &OutPoint, capacity: u64) {
        self.capacities.lock().unwrap().insert(out_point.key(), capacity);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn matches(filter: &CellFilter, cell: &Cell) -> bool {
        if cell.output.lock.code_hash != filter.lock.code_hash
            || cell.output.lock.hash_type != filter.lock.hash_type
            || !cell.output.lock.args.as_bytes().starts_with(filter.lock.args.as_bytes())
        {
            return false;
        }
        if let Some(type_script) = &filter.type_script {
            if cell.output.type_script.as_ref() != Some(type_script) {
                return false;
            }
        }
        if let Some((min, max)) = filter.capacity_range {
            if cell.output.capacity < min || cell.output.capacity >= max {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn collect_cells(
        &self,
        filter: &CellFilter,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<CellPage, RelayError> {
        let skip: usize = cursor.as_deref().map(|c| c.parse().unwrap()).unwrap_or(0);
        let matching: Vec<Cell> = self
            .cells
            .lock()
            .unwrap()
            .iter()
            .filter(|cell| Self::matches(filter, cell))
            .cloned()
            .collect();

        let cells: Vec<Cell> = matching.iter().skip(skip).take(limit).cloned().collect();
        let cursor = (skip + cells.len() < matching.len() && !cells.is_empty())
            .then(|| (skip + cells.len()).to_string());
        Ok(CellPage { cells, cursor })
    }

    async fn cell_capacity(&self, out_point: &OutPoint) -> Result<u64, RelayError> {
        Ok(self.capacities.lock().unwrap().get(&out_point.key()).copied().unwrap_or(500))
    }

    async fn send_transaction(&self, tx: &RawTransaction) -> Result<H256, RelayError> {
        if self.reject_sends.load(Ordering::Relaxed) {
            return Err(RelayError::ChainRpc {
                code: -301,
                message: "TransactionFailedToResolve".into(),
            });
        }
        self.sent.lock().unwrap().push(tx.clone());
        let n = self.send_counter.fetch_add(1, Ordering::Relaxed);
        Ok(H256([n as u8 + 1; 32]))
    }

    async fn transaction_status(&self, _hash: &H256) -> Result<LedgerTxStatus, RelayError> {
        Ok(LedgerTxStatus::Committed)
    }
}

/// Mock proof service; proofs echo the txid so witnesses are inspectable.
#[derive(Debug, Default)]
pub struct MockProof {
    pub calls: AtomicU64,
}

#[async_trait]
impl ProofApi for MockProof {
    async fn tx_proof(&self, txid: &Txid, _confirmations: u32) -> Result<TxProof, RelayError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(TxProof { proof: JsonBytes(txid.to_byte_array().to_vec()) })
    }
}

/// Mock signer: passes the transaction through, recording which key was used.
#[derive(Debug, Default)]
pub struct MockSigner {
    pub signed_with: Mutex<Vec<SignerKey>>,
}

#[async_trait]
impl SignerApi for MockSigner {
    async fn sign(&self, key: SignerKey, tx: RawTransaction) -> Result<RawTransaction, RelayError> {
        self.signed_with.lock().unwrap().push(key);
        Ok(tx)
    }
}
