//! Fee-cell allocator behavior against the in-memory store.

mod common;

use common::{fee_cell, paymaster_config, txid, MockLedger, MockSigner};
use futures_util::future::join_all;
use rgbpp_relay::{
    clients::DynLedger,
    error::RelayError,
    paymaster::Paymaster,
    signers::{DynSigner, SignerKey},
    storage::RelayStorage,
    types::{CellInput, CellOutput, JsonBytes, OutPoint, RawTransaction, Script},
};
use std::{collections::HashSet, sync::Arc};

fn paymaster_with_cells(cells: Vec<rgbpp_relay::types::Cell>) -> (Arc<Paymaster>, Arc<MockLedger>, Arc<MockSigner>) {
    let ledger = Arc::new(MockLedger::with_cells(cells));
    let signer = Arc::new(MockSigner::default());
    let paymaster = Arc::new(Paymaster::new(
        RelayStorage::in_memory(),
        Arc::clone(&ledger) as DynLedger,
        Arc::clone(&signer) as DynSigner,
        paymaster_config(),
    ));
    (paymaster, ledger, signer)
}

#[tokio::test]
async fn concurrent_leases_never_share_a_cell() {
    let (paymaster, _, _) = paymaster_with_cells((0..8).map(fee_cell).collect());
    paymaster.refill().await.unwrap();

    let leases = join_all((0..4u8).map(|n| {
        let paymaster = Arc::clone(&paymaster);
        async move { paymaster.lease_cell(&txid(n)).await.unwrap() }
    }))
    .await;

    let outpoints: HashSet<String> =
        leases.iter().map(|cell| cell.out_point.key()).collect();
    assert_eq!(outpoints.len(), 4, "every token must get a distinct cell");
}

#[tokio::test]
async fn refill_is_idempotent() {
    let (paymaster, _, _) = paymaster_with_cells((0..3).map(fee_cell).collect());

    // Only 3 cells upstream against a preset of 4: the refill comes up short
    // but does not error.
    let added = paymaster.refill().await.unwrap();
    assert_eq!(added, 3);

    // Re-scanning unchanged chain state enqueues nothing new.
    let added = paymaster.refill().await.unwrap();
    assert_eq!(added, 0);
    assert_eq!(paymaster.status().await.unwrap().waiting, 3);
}

#[tokio::test]
async fn lease_triggers_refill_below_watermark() {
    // Pool starts empty; watermark is preset * threshold = 2, so the first
    // lease refills from the chain before claiming.
    let (paymaster, _, _) = paymaster_with_cells((0..4).map(fee_cell).collect());

    let cell = paymaster.lease_cell(&txid(1)).await.unwrap();
    assert_eq!(cell.output.capacity, 1_000);
    assert_eq!(paymaster.status().await.unwrap().waiting, 3);
}

#[tokio::test]
async fn spent_cells_are_never_reused() {
    let (paymaster, _, _) = paymaster_with_cells(vec![fee_cell(0), fee_cell(1)]);
    paymaster.refill().await.unwrap();

    let leased = paymaster.lease_cell(&txid(1)).await.unwrap();
    let spent_outpoint = leased.out_point.clone();

    let spend = RawTransaction {
        inputs: vec![CellInput { previous_output: spent_outpoint.clone(), since: 0 }],
        ..RawTransaction::default()
    };
    let retired = paymaster.mark_spent(&txid(1), &spend).await.unwrap();
    assert_eq!(retired, 1);

    // The other cell is still leasable; the spent one never comes back.
    let next = paymaster.lease_cell(&txid(2)).await.unwrap();
    assert_ne!(next.out_point, spent_outpoint);

    let err = paymaster.lease_cell(&txid(3)).await.unwrap_err();
    assert!(matches!(err, RelayError::ResourceExhaustion { .. }));
}

#[tokio::test]
async fn exhaustion_is_reported_not_fatal() {
    let (paymaster, _, _) = paymaster_with_cells(vec![]);

    let err = paymaster.lease_cell(&txid(9)).await.unwrap_err();
    match err {
        RelayError::ResourceExhaustion { waiting, preset } => {
            assert_eq!(waiting, 0);
            assert_eq!(preset, 4);
        }
        other => panic!("expected ResourceExhaustion, got {other}"),
    }
}

#[tokio::test]
async fn repeated_lease_for_token_reuses_cell() {
    let (paymaster, _, _) = paymaster_with_cells((0..4).map(fee_cell).collect());
    paymaster.refill().await.unwrap();

    let first = paymaster.lease_cell(&txid(7)).await.unwrap();
    let again = paymaster.lease_cell(&txid(7)).await.unwrap();
    assert_eq!(first.out_point, again.out_point, "a token re-uses its live lease");

    // Only one cell left the waiting pool.
    assert_eq!(paymaster.status().await.unwrap().waiting, 3);
}

#[tokio::test]
async fn append_cell_and_sign_adds_input_and_change() {
    let (paymaster, _, signer) = paymaster_with_cells((0..4).map(fee_cell).collect());
    paymaster.refill().await.unwrap();

    let user_lock = Script::default();
    let tx = RawTransaction {
        inputs: vec![CellInput {
            previous_output: OutPoint { tx_hash: common::h256(0x01), index: 0 },
            since: 0,
        }],
        outputs: vec![CellOutput { capacity: 400, lock: user_lock, type_script: None }],
        outputs_data: vec![JsonBytes::default()],
        witnesses: vec![JsonBytes::default()],
        ..RawTransaction::default()
    };

    let signed = paymaster.append_cell_and_sign(&txid(5), tx, 500).await.unwrap();

    assert_eq!(signed.inputs.len(), 2);
    assert_eq!(signed.outputs.len(), 2);
    // change = inputs 500 + fee cell 1000 - outputs 400 - fee 10
    assert_eq!(signed.outputs[1].capacity, 1_090);
    assert_eq!(signed.outputs[1].lock, common::paymaster_lock());
    assert_eq!(signed.outputs.len(), signed.outputs_data.len());
    assert_eq!(*signer.signed_with.lock().unwrap(), vec![SignerKey::Paymaster]);
}

#[tokio::test]
async fn append_rejects_insufficient_capacity() {
    let (paymaster, _, _) = paymaster_with_cells((0..4).map(fee_cell).collect());
    paymaster.refill().await.unwrap();

    // Outputs demand more than inputs + fee cell can cover.
    let tx = RawTransaction {
        outputs: vec![CellOutput {
            capacity: 10_000,
            lock: Script::default(),
            type_script: None,
        }],
        outputs_data: vec![JsonBytes::default()],
        ..RawTransaction::default()
    };

    let err = paymaster.append_cell_and_sign(&txid(6), tx, 100).await.unwrap_err();
    assert!(err.is_validation());

    // The lease is returned immediately rather than waiting out its TTL.
    assert_eq!(paymaster.status().await.unwrap().waiting, 4);
}
