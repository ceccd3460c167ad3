//! Ledger JSON-RPC and indexer client.

use super::{CellFilter, CellPage, LedgerApi, LedgerTxStatus};
use crate::{
    error::RelayError,
    types::{Cell, CellOutput, JsonBytes, OutPoint, RawTransaction, Script, H256},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Ledger client speaking JSON-RPC 2.0 to a node and its indexer.
#[derive(Debug)]
pub struct LedgerClient {
    http: reqwest::Client,
    rpc_url: Url,
    indexer_url: Url,
    id: AtomicU64,
}

impl LedgerClient {
    /// Creates a new client. `indexer_url` defaults to `rpc_url` for nodes
    /// serving the indexer on the same endpoint.
    pub fn new(rpc_url: Url, indexer_url: Option<Url>) -> Self {
        let indexer_url = indexer_url.unwrap_or_else(|| rpc_url.clone());
        Self { http: reqwest::Client::new(), rpc_url, indexer_url, id: AtomicU64::new(0) }
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        url: &Url,
        method: &str,
        params: P,
    ) -> Result<T, RelayError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response: RpcResponse<T> =
            self.http.post(url.clone()).json(&request).send().await?.json().await?;

        if let Some(err) = response.error {
            // Preserve the remote code and message verbatim.
            return Err(RelayError::ChainRpc { code: err.code, message: err.message });
        }
        response.result.ok_or_else(|| {
            RelayError::ChainRpc { code: 0, message: format!("{method}: empty rpc result") }
        })
    }
}

/// Indexer `get_cells` response.
#[derive(Deserialize)]
struct IndexerPage {
    objects: Vec<IndexerCell>,
    last_cursor: String,
}

#[derive(Deserialize)]
struct IndexerCell {
    out_point: OutPoint,
    output: CellOutput,
    output_data: Option<JsonBytes>,
    #[serde(with = "crate::serde::hex_u64")]
    block_number: u64,
}

#[derive(Serialize)]
struct SearchKey<'a> {
    script: &'a Script,
    script_type: &'static str,
    script_search_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<SearchFilter<'a>>,
}

#[derive(Serialize)]
struct SearchFilter<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<&'a Script>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_capacity_range: Option<[String; 2]>,
}

#[derive(Deserialize)]
struct LiveCell {
    cell: Option<LiveCellInner>,
    status: String,
}

#[derive(Deserialize)]
struct LiveCellInner {
    output: CellOutput,
}

#[derive(Deserialize)]
struct TxWithStatus {
    tx_status: TxStatusObject,
}

#[derive(Deserialize)]
struct TxStatusObject {
    status: String,
    reason: Option<String>,
}

#[async_trait]
impl LedgerApi for LedgerClient {
    async fn collect_cells(
        &self,
        filter: &CellFilter,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<CellPage, RelayError> {
        let search_key = SearchKey {
            script: &filter.lock,
            script_type: "lock",
            script_search_mode: "prefix",
            filter: (filter.type_script.is_some() || filter.capacity_range.is_some()).then(|| {
                SearchFilter {
                    script: filter.type_script.as_ref(),
                    output_capacity_range: filter
                        .capacity_range
                        .map(|(min, max)| [format!("{min:#x}"), format!("{max:#x}")]),
                }
            }),
        };

        let page: IndexerPage = self
            .call(
                &self.indexer_url,
                "get_cells",
                json!([search_key, "asc", format!("{limit:#x}"), cursor]),
            )
            .await?;

        let exhausted = page.objects.is_empty();
        Ok(CellPage {
            cells: page
                .objects
                .into_iter()
                .map(|cell| Cell {
                    out_point: cell.out_point,
                    output: cell.output,
                    data: cell.output_data.unwrap_or_default(),
                    block_number: cell.block_number,
                })
                .collect(),
            cursor: (!exhausted).then_some(page.last_cursor),
        })
    }

    async fn cell_capacity(&self, out_point: &OutPoint) -> Result<u64, RelayError> {
        let live: LiveCell =
            self.call(&self.rpc_url, "get_live_cell", json!([out_point, false])).await?;
        match live.cell {
            Some(inner) if live.status == "live" => Ok(inner.output.capacity),
            _ => Err(RelayError::Validation(format!(
                "input {out_point} is not live: {}",
                live.status
            ))),
        }
    }

    async fn send_transaction(&self, tx: &RawTransaction) -> Result<H256, RelayError> {
        self.call(&self.rpc_url, "send_transaction", json!([tx, "passthrough"])).await
    }

    async fn transaction_status(&self, hash: &H256) -> Result<LedgerTxStatus, RelayError> {
        let tx: Option<TxWithStatus> =
            self.call(&self.rpc_url, "get_transaction", json!([hash])).await?;
        Ok(match tx {
            None => LedgerTxStatus::Unknown,
            Some(tx) => match tx.tx_status.status.as_str() {
                "pending" => LedgerTxStatus::Pending,
                "proposed" => LedgerTxStatus::Proposed,
                "committed" => LedgerTxStatus::Committed,
                "rejected" => LedgerTxStatus::Rejected(tx.tx_status.reason.unwrap_or_default()),
                _ => LedgerTxStatus::Unknown,
            },
        })
    }
}
