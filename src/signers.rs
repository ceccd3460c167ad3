//! Signing collaborator.
//!
//! Signing is delegated to an external service holding the paymaster and
//! operator keys; the relay never touches key material.

use crate::{error::RelayError, types::RawTransaction};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use url::Url;

/// Which key the signing service should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKey {
    /// The paymaster key, for fee-cell inputs.
    Paymaster,
    /// The operator key, for unlock transactions.
    Operator,
}

impl SignerKey {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Paymaster => "paymaster",
            Self::Operator => "operator",
        }
    }
}

/// Signing collaborator interface.
#[async_trait]
pub trait SignerApi: Debug + Send + Sync {
    /// Signs `tx` with the requested key, returning the signed transaction.
    async fn sign(&self, key: SignerKey, tx: RawTransaction) -> Result<RawTransaction, RelayError>;
}

/// Shared handle to a [`SignerApi`].
pub type DynSigner = Arc<dyn SignerApi>;

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RawTransaction>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Signing service reached over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    http: reqwest::Client,
    endpoint: Url,
}

impl RemoteSigner {
    /// Creates a new client for `endpoint`.
    pub fn new(endpoint: Url) -> Self {
        Self { http: reqwest::Client::new(), endpoint }
    }
}

#[async_trait]
impl SignerApi for RemoteSigner {
    async fn sign(&self, key: SignerKey, tx: RawTransaction) -> Result<RawTransaction, RelayError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "signTransaction",
            "params": [key.as_str(), tx],
        });
        let response: RpcResponse =
            self.http.post(self.endpoint.clone()).json(&request).send().await?.json().await?;

        if let Some(err) = response.error {
            return Err(RelayError::ChainRpc { code: err.code, message: err.message });
        }
        response
            .result
            .ok_or_else(|| RelayError::ChainRpc { code: 0, message: "empty signing result".into() })
    }
}
