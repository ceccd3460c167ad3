//! Time-lock unlocker.
//!
//! Periodically releases ledger cells whose referenced Bitcoin transaction
//! has reached its required confirmation depth. No per-cell state is
//! persisted: eligibility is recomputed from chain truth on every run, so a
//! tick interrupted mid-run is simply retried on the next one and cells
//! unlocked in the meantime vanish from the scan.

use crate::{
    clients::{CellFilter, DynBtcData, DynLedger, DynProof},
    config::{AssetsConfig, ConfirmationPolicy, PaymasterConfig, UnlockerConfig},
    constants::CELL_COLLECT_PAGE_SIZE,
    error::RelayError,
    metrics::UnlockerMetrics,
    signers::{DynSigner, SignerKey},
    types::{
        AssetKind, Cell, CellInput, CellOutput, JsonBytes, RawTransaction, Script, TimeLockArgs,
        TimeLockCell, H256,
    },
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info, warn};

/// Unlocks time-lock cells once their Bitcoin condition is satisfied.
#[derive(Debug)]
pub struct Unlocker {
    btc: DynBtcData,
    ledger: DynLedger,
    proof: DynProof,
    signer: DynSigner,
    config: UnlockerConfig,
    assets: AssetsConfig,
    /// Lock owning the operator's plain funds used for unlock fees.
    fee_lock: Script,
    /// Pool cell capacity; fee funding skips cells of exactly this size so
    /// the unlocker never drains the fee-cell pool.
    pool_cell_capacity: u64,
    tx_fee: u64,
    metrics: UnlockerMetrics,
}

impl Unlocker {
    /// Creates a new [`Unlocker`].
    pub fn new(
        btc: DynBtcData,
        ledger: DynLedger,
        proof: DynProof,
        signer: DynSigner,
        config: UnlockerConfig,
        assets: AssetsConfig,
        paymaster: &PaymasterConfig,
    ) -> Self {
        Self {
            btc,
            ledger,
            proof,
            signer,
            config,
            assets,
            fee_lock: paymaster.lock.clone(),
            pool_cell_capacity: paymaster.cell_capacity,
            tx_fee: paymaster.tx_fee,
            metrics: UnlockerMetrics::default(),
        }
    }

    fn classify(&self, cell: &Cell) -> Option<AssetKind> {
        let type_script = cell.output.type_script.as_ref()?;
        if type_script.code_hash == self.assets.fungible_code_hash {
            Some(AssetKind::Fungible)
        } else if type_script.code_hash == self.assets.nft_code_hash {
            Some(AssetKind::Nft)
        } else {
            None
        }
    }

    fn recommended_depth(&self, kind: AssetKind) -> u32 {
        self.config
            .recommended_depths
            .get(&kind)
            .copied()
            .unwrap_or(crate::constants::RECOMMENDED_CONFIRMATION_DEPTH)
    }

    /// Scans for time-lock cells whose Bitcoin transaction is confirmed at
    /// sufficient depth, collecting at most `batch` of them.
    pub async fn list_eligible_cells(&self, batch: usize) -> Result<Vec<TimeLockCell>, RelayError> {
        let tip = self.btc.chain_info().await?.height;
        let filter = CellFilter {
            lock: Script {
                code_hash: self.config.time_lock_code_hash,
                hash_type: self.config.time_lock_hash_type,
                args: JsonBytes::default(),
            },
            type_script: None,
            capacity_range: None,
        };

        let mut eligible = Vec::new();
        let mut cursor = None;

        'scan: loop {
            let page = self.ledger.collect_cells(&filter, CELL_COLLECT_PAGE_SIZE, cursor).await?;
            for cell in page.cells {
                let args = match TimeLockArgs::decode(cell.output.lock.args.as_bytes()) {
                    Ok(args) => args,
                    Err(err) => {
                        warn!(cell = %cell.out_point, %err, "skipping undecodable time-lock cell");
                        continue;
                    }
                };
                let Some(kind) = self.classify(&cell) else {
                    warn!(cell = %cell.out_point, "skipping time-lock cell with unknown asset type");
                    continue;
                };

                let status = self.btc.tx_status(&args.btc_txid).await?;
                let Some(height) = status.block_height.filter(|_| status.confirmed) else {
                    continue;
                };
                let depth = tip.saturating_sub(height);
                if depth < args.after as u64 {
                    continue;
                }

                let recommended = self.recommended_depth(kind);
                if args.after < recommended {
                    match self.config.confirmation_policy {
                        ConfirmationPolicy::Warn => {
                            self.metrics.below_recommended.increment(1);
                            warn!(
                                cell = %cell.out_point,
                                btc_txid = %args.btc_txid,
                                after = args.after,
                                recommended,
                                "unlocking below recommended confirmation depth"
                            );
                        }
                        ConfirmationPolicy::Defer => {
                            self.metrics.deferred.increment(1);
                            warn!(
                                cell = %cell.out_point,
                                btc_txid = %args.btc_txid,
                                after = args.after,
                                recommended,
                                "deferring cell below recommended confirmation depth"
                            );
                            continue;
                        }
                    }
                }

                eligible.push(TimeLockCell { cell, args, kind });
                if eligible.len() >= batch {
                    break 'scan;
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(eligible)
    }

    /// Builds one unlock transaction per non-empty asset-kind partition.
    ///
    /// Fungible and NFT cells need distinct unlock shapes, so they never
    /// share a transaction. Witnesses carry the Bitcoin tx proof per input.
    pub async fn build_unlock_transactions(
        &self,
        cells: &[TimeLockCell],
    ) -> Result<Vec<RawTransaction>, RelayError> {
        let mut partitions: BTreeMap<AssetKind, Vec<&TimeLockCell>> = BTreeMap::new();
        for cell in cells {
            partitions.entry(cell.kind).or_default().push(cell);
        }

        let mut txs = Vec::with_capacity(partitions.len());
        for (kind, cells) in partitions {
            let mut tx = RawTransaction::default();
            for entry in &cells {
                tx.inputs.push(CellInput {
                    previous_output: entry.cell.out_point.clone(),
                    since: 0,
                });
                tx.outputs.push(CellOutput {
                    capacity: entry.cell.output.capacity,
                    lock: entry.args.owner_lock.clone(),
                    type_script: entry.cell.output.type_script.clone(),
                });
                tx.outputs_data.push(entry.cell.data.clone());

                let proof = self.proof.tx_proof(&entry.args.btc_txid, entry.args.after).await?;
                tx.witnesses.push(proof.proof);
            }
            debug!(%kind, cells = cells.len(), "built unlock transaction");
            txs.push(tx);
        }

        Ok(txs)
    }

    /// Appends a fee-funding input from the paymaster's plain funds, signs
    /// with the operator key, and broadcasts.
    pub async fn submit_unlock(&self, mut tx: RawTransaction) -> Result<H256, RelayError> {
        let funding = self.collect_funding_cell().await?;

        tx.inputs.push(CellInput { previous_output: funding.out_point, since: 0 });
        tx.witnesses.push(JsonBytes::default());
        tx.outputs.push(CellOutput {
            capacity: funding.output.capacity - self.tx_fee,
            lock: self.fee_lock.clone(),
            type_script: None,
        });
        tx.outputs_data.push(JsonBytes::default());

        let signed = self.signer.sign(SignerKey::Operator, tx).await?;
        self.ledger.send_transaction(&signed).await
    }

    async fn collect_funding_cell(&self) -> Result<Cell, RelayError> {
        let filter = CellFilter {
            lock: self.fee_lock.clone(),
            type_script: None,
            capacity_range: Some((self.pool_cell_capacity + 1, u64::MAX)),
        };

        let mut cursor = None;
        loop {
            let page = self.ledger.collect_cells(&filter, CELL_COLLECT_PAGE_SIZE, cursor).await?;
            if let Some(cell) =
                page.cells.into_iter().find(|cell| cell.output.capacity > self.tx_fee)
            {
                return Ok(cell);
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(RelayError::Validation(
                        "no funding cell available for unlock fee".into(),
                    ))
                }
            }
        }
    }

    /// One unlock pass: scan, build, submit.
    ///
    /// Returns the submitted transaction hashes; with no eligible cells this
    /// returns empty without touching the chain.
    pub async fn run(&self) -> Result<Vec<H256>, RelayError> {
        self.metrics.runs.increment(1);

        let cells = self.list_eligible_cells(self.config.batch_size).await?;
        if cells.is_empty() {
            debug!("no time-lock cells eligible for unlock");
            return Ok(Vec::new());
        }

        info!(cells = cells.len(), "unlocking time-lock cells");
        let txs = self.build_unlock_transactions(&cells).await?;

        let mut hashes = Vec::with_capacity(txs.len());
        for tx in txs {
            let hash = self.submit_unlock(tx).await?;
            self.metrics.submitted.increment(1);
            info!(%hash, "unlock transaction submitted");
            hashes.push(hash);
        }
        self.metrics.unlocked.increment(cells.len() as u64);

        Ok(hashes)
    }

    /// Spawns the periodic unlock loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut clock = interval(self.config.interval);
            loop {
                clock.tick().await;
                if let Err(err) = self.run().await {
                    error!(%err, "unlock run failed");
                }
            }
        })
    }
}
