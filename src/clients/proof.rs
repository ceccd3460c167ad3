//! Cross-chain proof service client.

use super::{ProofApi, TxProof};
use crate::error::RelayError;
use async_trait::async_trait;
use bitcoin::Txid;
use serde::Deserialize;
use serde_json::json;
use url::Url;

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<TxProof>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP client for the proof service.
#[derive(Debug, Clone)]
pub struct ProofClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ProofClient {
    /// Creates a new client for `endpoint`.
    pub fn new(endpoint: Url) -> Self {
        Self { http: reqwest::Client::new(), endpoint }
    }
}

#[async_trait]
impl ProofApi for ProofClient {
    async fn tx_proof(&self, txid: &Txid, confirmations: u32) -> Result<TxProof, RelayError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "getTxProof",
            "params": [txid.to_string(), confirmations],
        });
        let response: RpcResponse =
            self.http.post(self.endpoint.clone()).json(&request).send().await?.json().await?;

        if let Some(err) = response.error {
            return Err(RelayError::ChainRpc { code: err.code, message: err.message });
        }
        response
            .result
            .ok_or_else(|| RelayError::ChainRpc { code: 0, message: "empty proof result".into() })
    }
}
