//! Settlement transaction queue.
//!
//! Accepts user-submitted settlement transactions keyed by their Bitcoin
//! txid, delays them until the Bitcoin side has had time to propagate, then
//! finalizes each one: re-validate the Bitcoin transaction, lease a fee cell,
//! sign, broadcast, retire the cell. Failures re-delay the job per the
//! configured backoff up to the attempt ceiling.

use crate::{
    clients::{DynBtcData, DynLedger, LedgerTxStatus},
    config::QueueConfig,
    constants::SETTLEMENT_QUEUE,
    error::RelayError,
    metrics::SettlementMetrics,
    paymaster::Paymaster,
    storage::{Job, RelayStorage, StorageApi},
    types::{RawTransaction, H256},
};
use bitcoin::Txid;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, Instant},
};
use tracing::{debug, error, info, warn};

/// A queued settlement transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementJob {
    /// The referenced Bitcoin transaction; doubles as the job id and the
    /// fee-cell lease token.
    pub token: Txid,
    /// The raw ledger transaction to finalize.
    pub tx: RawTransaction,
}

/// Settlement queue over the shared store.
#[derive(Debug)]
pub struct SettlementQueue {
    storage: RelayStorage,
    btc: DynBtcData,
    ledger: DynLedger,
    paymaster: Arc<Paymaster>,
    config: QueueConfig,
    metrics: SettlementMetrics,
}

impl SettlementQueue {
    /// Creates a new [`SettlementQueue`].
    pub fn new(
        storage: RelayStorage,
        btc: DynBtcData,
        ledger: DynLedger,
        paymaster: Arc<Paymaster>,
        config: QueueConfig,
    ) -> Self {
        Self { storage, btc, ledger, paymaster, config, metrics: SettlementMetrics::default() }
    }

    /// Accepts a settlement transaction for asynchronous processing.
    ///
    /// The job becomes visible to workers after the configured delay, giving
    /// the Bitcoin transaction time to reach the data provider. Re-submitting
    /// a token is a no-op and returns `false`.
    pub async fn enqueue(&self, token: Txid, tx: RawTransaction) -> Result<bool, RelayError> {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(RelayError::Validation(
                "settlement transaction must have inputs and outputs".into(),
            ));
        }
        if tx.outputs.len() != tx.outputs_data.len() {
            return Err(RelayError::Validation(format!(
                "outputs_data length {} does not match outputs length {}",
                tx.outputs_data.len(),
                tx.outputs.len()
            )));
        }

        let job = SettlementJob { token, tx };
        let accepted = self
            .storage
            .enqueue(
                SETTLEMENT_QUEUE,
                &token.to_string(),
                serde_json::to_value(&job)?,
                Utc::now() + self.config.process_delay,
            )
            .await?;

        if accepted {
            self.metrics.enqueued.increment(1);
            info!(%token, delay = ?self.config.process_delay, "settlement accepted");
        } else {
            debug!(%token, "duplicate settlement token ignored");
        }
        Ok(accepted)
    }

    /// Starts a bounded worker pool consuming the queue.
    pub fn start(self: Arc<Self>) -> SettlementHandle {
        let (shutdown_tx, _) = watch::channel(false);
        let workers = (0..self.config.concurrency)
            .map(|index| {
                let queue = Arc::clone(&self);
                let shutdown = shutdown_tx.subscribe();
                tokio::spawn(queue.worker(index, shutdown))
            })
            .collect();

        SettlementHandle { shutdown: shutdown_tx, workers }
    }

    /// Processes due jobs until the queue is empty or `deadline` is reached.
    ///
    /// One-shot mode for invocations running under an external execution-time
    /// limit: the deadline is checked between jobs, so a claimed job is always
    /// drained before returning and never abandoned mid-mutation.
    pub async fn drain_until(&self, deadline: Instant) -> Result<usize, RelayError> {
        let lessee = format!("drain-{}", std::process::id());
        let mut processed = 0;
        while Instant::now() < deadline {
            let claimed =
                self.storage.claim(SETTLEMENT_QUEUE, &lessee, self.config.lease_ttl).await?;
            match claimed {
                Some(job) => {
                    self.handle_job(job).await;
                    processed += 1;
                }
                None => break,
            }
        }
        Ok(processed)
    }

    async fn worker(self: Arc<Self>, index: usize, mut shutdown: watch::Receiver<bool>) {
        // Lessee names are unique across processes sharing the store, so the
        // claim's lease-reuse rule can never hand one worker another's job.
        let lessee = format!("worker-{}-{index}", std::process::id());
        let mut poll = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = poll.tick() => {}
            }

            // Drain everything due, then go back to sleep. The shutdown flag
            // is re-checked between jobs so a pause stops intake without
            // cutting off the job in flight.
            while !*shutdown.borrow() {
                match self.storage.claim(SETTLEMENT_QUEUE, &lessee, self.config.lease_ttl).await {
                    Ok(Some(job)) => self.handle_job(job).await,
                    Ok(None) => break,
                    Err(err) => {
                        error!(worker = index, %err, "failed to claim settlement job");
                        break;
                    }
                }
            }
        }

        debug!(worker = index, "settlement worker stopped");
    }

    async fn handle_job(&self, job: Job) {
        let started = Instant::now();
        self.metrics.active.increment(1.0);

        let outcome = match serde_json::from_value::<SettlementJob>(job.payload.clone()) {
            Ok(payload) => self.process(&payload).await.map(|hash| (payload.token, hash)),
            Err(err) => {
                // A payload we cannot even decode will never succeed.
                error!(id = %job.id, %err, "malformed settlement payload");
                if let Err(err) = self.storage.fail(SETTLEMENT_QUEUE, &job.id).await {
                    error!(id = %job.id, %err, "failed to mark settlement job failed");
                }
                self.metrics.failed.increment(1);
                self.metrics.active.decrement(1.0);
                return;
            }
        };

        match outcome {
            Ok((token, tx_hash)) => {
                if let Err(err) = self.storage.complete(SETTLEMENT_QUEUE, &job.id).await {
                    error!(%token, %err, "failed to complete settlement job");
                }
                self.metrics.completed.increment(1);
                self.metrics.processing_time.record(started.elapsed().as_millis() as f64);
                info!(%token, %tx_hash, attempts = job.attempts, "settlement finalized");
            }
            Err(err) => self.handle_failure(&job, err).await,
        }

        self.metrics.active.decrement(1.0);
    }

    async fn handle_failure(&self, job: &Job, err: RelayError) {
        let attempt = job.attempts + 1;
        if attempt >= self.config.max_attempts {
            if let Err(err) = self.storage.fail(SETTLEMENT_QUEUE, &job.id).await {
                error!(id = %job.id, %err, "failed to mark settlement job failed");
            }
            self.metrics.failed.increment(1);
            error!(
                id = %job.id,
                attempts = attempt,
                %err,
                "settlement permanently failed; giving up"
            );
            return;
        }

        let delay = self.config.backoff.delay(job.attempts);
        if let Err(err) = self.storage.retry(SETTLEMENT_QUEUE, &job.id, Utc::now() + delay).await {
            error!(id = %job.id, %err, "failed to re-delay settlement job");
            return;
        }
        self.metrics.retried.increment(1);
        warn!(id = %job.id, attempt, ?delay, %err, "settlement attempt failed; retrying");
    }

    async fn process(&self, job: &SettlementJob) -> Result<H256, RelayError> {
        // The referenced Bitcoin transaction must still be visible; a
        // transaction the provider no longer knows is a retryable failure.
        let status = self.btc.tx_status(&job.token).await?;
        debug!(token = %job.token, confirmed = status.confirmed, "bitcoin tx visible");

        let inputs_capacity = self.sum_inputs_capacity(&job.tx).await?;
        let signed =
            self.paymaster.append_cell_and_sign(&job.token, job.tx.clone(), inputs_capacity).await?;
        let tx_hash = self.ledger.send_transaction(&signed).await?;

        // A node can accept a transaction and reject it on resolution; one
        // status check surfaces that as a retryable failure instead of
        // silently retiring the fee cell.
        if let LedgerTxStatus::Rejected(reason) = self.ledger.transaction_status(&tx_hash).await? {
            return Err(RelayError::ChainRpc {
                code: -1,
                message: format!("transaction rejected: {reason}"),
            });
        }
        self.paymaster.mark_spent(&job.token, &signed).await?;

        Ok(tx_hash)
    }

    async fn sum_inputs_capacity(&self, tx: &RawTransaction) -> Result<u64, RelayError> {
        let mut sum = 0u64;
        for input in &tx.inputs {
            sum += self.ledger.cell_capacity(&input.previous_output).await?;
        }
        Ok(sum)
    }
}

/// Handle to a running settlement worker pool.
#[derive(Debug)]
pub struct SettlementHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl SettlementHandle {
    /// Stops intake: workers finish their in-flight job and claim no more.
    pub fn pause(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Cooperative drain: pauses intake, then waits for all workers to
    /// finish their in-flight work and exit.
    pub async fn close(self) {
        self.pause();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
