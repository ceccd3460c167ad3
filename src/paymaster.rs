//! Fee-cell allocator.
//!
//! The paymaster owns a pool of fixed-capacity fee cells and leases exactly
//! one per settlement token. Pool bookkeeping lives in the shared queue store;
//! the store's atomic claim is what makes the never-double-lease guarantee
//! hold, including across processes. The in-store refill lease only prevents
//! redundant concurrent refills; refill itself is idempotent, so a race past
//! the lease cannot duplicate allocation.

use crate::{
    clients::{CellFilter, DynLedger},
    config::PaymasterConfig,
    constants::{CELL_COLLECT_PAGE_SIZE, FEE_CELL_QUEUE, REFILL_LEASE},
    error::RelayError,
    metrics::PaymasterMetrics,
    signers::{DynSigner, SignerKey},
    storage::{JobState, RelayStorage, StorageApi},
    types::{Cell, CellInput, CellOutput, JsonBytes, RawTransaction},
};
use bitcoin::Txid;
use chrono::Utc;
use tracing::{debug, error, info, warn};

/// Point-in-time view of the pool, for operational visibility.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Cells currently waiting to be leased.
    pub waiting: usize,
    /// Configured preset pool size.
    pub preset: usize,
}

/// Fee-cell allocator backed by the shared queue store.
#[derive(Debug)]
pub struct Paymaster {
    storage: RelayStorage,
    ledger: DynLedger,
    signer: DynSigner,
    config: PaymasterConfig,
    metrics: PaymasterMetrics,
}

impl Paymaster {
    /// Creates a new [`Paymaster`].
    pub fn new(
        storage: RelayStorage,
        ledger: DynLedger,
        signer: DynSigner,
        config: PaymasterConfig,
    ) -> Self {
        Self { storage, ledger, signer, config, metrics: PaymasterMetrics::default() }
    }

    /// Waiting count below which a refill is triggered.
    fn refill_watermark(&self) -> usize {
        (self.config.preset_count as f64 * self.config.refill_threshold).ceil() as usize
    }

    /// Leases a fee cell exclusively for `token`.
    ///
    /// A token holding a live lease gets the same cell back rather than a
    /// second one. Fails with [`RelayError::ResourceExhaustion`] if no cell is
    /// available after a refill attempt; callers treat that as retryable.
    pub async fn lease_cell(&self, token: &Txid) -> Result<Cell, RelayError> {
        let waiting = self.storage.waiting_count(FEE_CELL_QUEUE).await?;
        if waiting < self.refill_watermark()
            && self
                .storage
                .try_acquire_lease(REFILL_LEASE, self.config.refill_lease_ttl)
                .await?
        {
            let refilled = self.refill().await;
            self.storage.release_lease(REFILL_LEASE).await?;
            refilled?;
        }

        let claimed = self
            .storage
            .claim(FEE_CELL_QUEUE, &token.to_string(), self.config.cell_lease_ttl)
            .await?;

        match claimed {
            Some(job) => {
                self.metrics.leased.increment(1);
                debug!(%token, cell = %job.id, "leased fee cell");
                Ok(serde_json::from_value(job.payload)?)
            }
            None => {
                let waiting = self.storage.waiting_count(FEE_CELL_QUEUE).await?;
                self.metrics.exhausted.increment(1);
                error!(
                    %token,
                    waiting,
                    preset = self.config.preset_count,
                    "fee cell pool exhausted"
                );
                Err(RelayError::ResourceExhaustion { waiting, preset: self.config.preset_count })
            }
        }
    }

    /// Scans the chain for paymaster fee cells and enqueues unseen ones until
    /// the preset count is reached or the scan is exhausted.
    ///
    /// Idempotent: an already-enqueued outpoint (in any state, spent cells
    /// included) is skipped. Returns the number of newly enqueued cells.
    pub async fn refill(&self) -> Result<usize, RelayError> {
        let filter = CellFilter {
            lock: self.config.lock.clone(),
            type_script: None,
            capacity_range: Some((self.config.cell_capacity, self.config.cell_capacity + 1)),
        };

        let mut waiting = self.storage.waiting_count(FEE_CELL_QUEUE).await?;
        let mut added = 0;
        let mut cursor = None;

        'scan: while waiting < self.config.preset_count {
            let page = self.ledger.collect_cells(&filter, CELL_COLLECT_PAGE_SIZE, cursor).await?;
            for cell in &page.cells {
                let id = cell.out_point.key();
                if self
                    .storage
                    .enqueue(FEE_CELL_QUEUE, &id, serde_json::to_value(cell)?, Utc::now())
                    .await?
                {
                    added += 1;
                    waiting += 1;
                    if waiting >= self.config.preset_count {
                        break 'scan;
                    }
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.metrics.refilled.increment(added as u64);
        self.metrics.waiting.set(waiting as f64);

        if waiting < self.config.preset_count {
            self.metrics.short_refills.increment(1);
            warn!(
                added,
                waiting,
                preset = self.config.preset_count,
                "fee cell refill short of preset; paymaster funds may be running out"
            );
        } else {
            info!(added, waiting, "refilled fee cell pool");
        }

        Ok(added)
    }

    /// Leases a cell for `token`, appends it as an input with a change output,
    /// and signs with the paymaster key.
    ///
    /// `inputs_capacity` is the capacity sum of the transaction's existing
    /// inputs; the change returns everything above outputs plus the flat fee.
    pub async fn append_cell_and_sign(
        &self,
        token: &Txid,
        mut tx: RawTransaction,
        inputs_capacity: u64,
    ) -> Result<RawTransaction, RelayError> {
        let cell = self.lease_cell(token).await?;

        let outputs_capacity = tx.outputs_capacity();
        let change = match (inputs_capacity + cell.output.capacity)
            .checked_sub(outputs_capacity + self.config.tx_fee)
        {
            Some(change) => change,
            None => {
                // This transaction can never be broadcast, so the lease goes
                // straight back to waiting instead of running out its TTL.
                self.storage.release(FEE_CELL_QUEUE, &cell.out_point.key()).await?;
                return Err(RelayError::Validation(format!(
                    "insufficient capacity: inputs {} + fee cell {} < outputs {} + fee {}",
                    inputs_capacity, cell.output.capacity, outputs_capacity, self.config.tx_fee
                )));
            }
        };

        tx.inputs.push(CellInput { previous_output: cell.out_point, since: 0 });
        tx.outputs.push(CellOutput {
            capacity: change,
            lock: self.config.lock.clone(),
            type_script: None,
        });
        tx.outputs_data.push(JsonBytes::default());
        tx.witnesses.push(JsonBytes::default());

        self.signer.sign(SignerKey::Paymaster, tx).await
    }

    /// Permanently retires every leased pool cell spent by `tx`.
    ///
    /// This is the only path that removes a cell from pool bookkeeping. A
    /// lease that never reaches this point expires back to waiting via the
    /// store's visibility timeout, so the cell remains usable.
    pub async fn mark_spent(&self, token: &Txid, tx: &RawTransaction) -> Result<usize, RelayError> {
        let mut retired = 0;
        for input in &tx.inputs {
            let id = input.previous_output.key();
            if let Some(job) = self.storage.get(FEE_CELL_QUEUE, &id).await? {
                if job.state == JobState::Active {
                    self.storage.complete(FEE_CELL_QUEUE, &id).await?;
                    retired += 1;
                    debug!(%token, cell = %id, "retired spent fee cell");
                }
            }
        }

        if retired > 0 {
            self.metrics.spent.increment(retired as u64);
        }
        Ok(retired)
    }

    /// Returns the current pool status.
    pub async fn status(&self) -> Result<PoolStatus, RelayError> {
        Ok(PoolStatus {
            waiting: self.storage.waiting_count(FEE_CELL_QUEUE).await?,
            preset: self.config.preset_count,
        })
    }
}
