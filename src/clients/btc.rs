//! Bitcoin data provider over an esplora-style HTTP API.

use super::{BtcDataApi, BtcTxStatus, ChainInfo};
use crate::error::RelayError;
use async_trait::async_trait;
use bitcoin::Txid;
use url::Url;

/// Bitcoin data provider backed by an esplora-compatible endpoint.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    http: reqwest::Client,
    base: Url,
    chain: String,
}

impl EsploraClient {
    /// Creates a new client for `base`, reporting `chain` in [`ChainInfo`].
    pub fn new(base: Url, chain: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base, chain: chain.into() }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        self.base
            .join(path)
            .map_err(|err| RelayError::Validation(format!("bad btc endpoint path {path:?}: {err}")))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, RelayError> {
        let resp = self.http.get(self.endpoint(path)?).send().await?;
        let status = resp.status();
        if !status.is_success() {
            // Esplora reports errors as plain-text bodies; keep them verbatim.
            return Err(RelayError::ChainRpc {
                code: status.as_u16() as i64,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl BtcDataApi for EsploraClient {
    async fn chain_info(&self) -> Result<ChainInfo, RelayError> {
        let body = self.get("blocks/tip/height").await?.text().await?;
        let height = body
            .trim()
            .parse()
            .map_err(|err| RelayError::Validation(format!("bad tip height {body:?}: {err}")))?;
        Ok(ChainInfo { chain: self.chain.clone(), height })
    }

    async fn tx_status(&self, txid: &Txid) -> Result<BtcTxStatus, RelayError> {
        Ok(self.get(&format!("tx/{txid}/status")).await?.json().await?)
    }
}
