//! Relay configuration.

use crate::{
    constants::{
        DEFAULT_CELL_LEASE_TTL, DEFAULT_CONCURRENCY, DEFAULT_FEE_CELL_CAPACITY,
        DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_PRESET_COUNT, DEFAULT_PROCESS_DELAY,
        DEFAULT_REFILL_LEASE_TTL, DEFAULT_REFILL_THRESHOLD, DEFAULT_TX_FEE,
        DEFAULT_UNLOCK_BATCH_SIZE, DEFAULT_UNLOCK_INTERVAL,
    },
    types::{AssetKind, Script, ScriptHashType, H256},
};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};

/// Relay configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Bitcoin data provider configuration.
    pub bitcoin: BitcoinConfig,
    /// Ledger node and indexer configuration.
    pub ledger: LedgerConfig,
    /// Proof service endpoint.
    pub proof: ProofConfig,
    /// Signing service endpoint.
    pub signer: SignerServiceConfig,
    /// Fee-cell allocator configuration.
    #[serde(default)]
    pub paymaster: PaymasterConfig,
    /// Time-lock unlocker configuration.
    #[serde(default)]
    pub unlocker: UnlockerConfig,
    /// Settlement queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Asset type script code hashes.
    #[serde(default)]
    pub assets: AssetsConfig,
    /// Metrics server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database URL. Falls back to the in-memory store when unset.
    pub database_url: Option<String>,
}

impl RelayConfig {
    /// Sets the Bitcoin data provider endpoint.
    pub fn with_bitcoin_endpoint(mut self, endpoint: Option<url::Url>) -> Self {
        if let Some(endpoint) = endpoint {
            self.bitcoin.endpoint = endpoint;
        }
        self
    }

    /// Sets the ledger RPC endpoint.
    pub fn with_ledger_rpc(mut self, endpoint: Option<url::Url>) -> Self {
        if let Some(endpoint) = endpoint {
            self.ledger.rpc_url = endpoint;
        }
        self
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, database_url: Option<String>) -> Self {
        self.database_url = database_url.or(self.database_url);
        self
    }

    /// Sets the settlement processing delay.
    pub fn with_process_delay(mut self, delay: Option<Duration>) -> Self {
        if let Some(delay) = delay {
            self.queue.process_delay = delay;
        }
        self
    }

    /// Sets the maximum settlement attempts.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        if let Some(max_attempts) = max_attempts {
            self.queue.max_attempts = max_attempts;
        }
        self
    }

    /// Sets the number of settlement workers.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        if let Some(concurrency) = concurrency {
            self.queue.concurrency = concurrency;
        }
        self
    }

    /// Sets the port the metrics server listens on.
    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.server.metrics_port = port;
        }
        self
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Bitcoin data provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// Esplora-compatible HTTP endpoint.
    pub endpoint: url::Url,
    /// Network name reported in chain info, e.g. `main` or `test`.
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "main".into()
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mempool.space/api/".parse().expect("static url"),
            network: default_network(),
        }
    }
}

/// Ledger node and indexer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Node JSON-RPC endpoint.
    pub rpc_url: url::Url,
    /// Indexer endpoint; defaults to `rpc_url` when unset.
    #[serde(default)]
    pub indexer_url: Option<url::Url>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { rpc_url: "http://127.0.0.1:8114/".parse().expect("static url"), indexer_url: None }
    }
}

/// Proof service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Proof service JSON-RPC endpoint.
    pub endpoint: url::Url,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self { endpoint: "http://127.0.0.1:8116/".parse().expect("static url") }
    }
}

/// Signing service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerServiceConfig {
    /// Signing service JSON-RPC endpoint.
    pub endpoint: url::Url,
}

impl Default for SignerServiceConfig {
    fn default() -> Self {
        Self { endpoint: "http://127.0.0.1:8117/".parse().expect("static url") }
    }
}

/// Fee-cell allocator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymasterConfig {
    /// Lock script owning the paymaster's cells.
    pub lock: Script,
    /// Capacity of a single fee cell, in shannons.
    pub cell_capacity: u64,
    /// Number of fee cells the pool aims to keep waiting.
    pub preset_count: usize,
    /// Fraction of the preset count below which a refill is triggered.
    pub refill_threshold: f64,
    /// Flat transaction fee paid from the appended fee cell, in shannons.
    pub tx_fee: u64,
    /// Visibility timeout of a fee-cell lease.
    #[serde(with = "crate::serde::duration")]
    pub cell_lease_ttl: Duration,
    /// TTL of the refill guard lease.
    #[serde(with = "crate::serde::duration")]
    pub refill_lease_ttl: Duration,
}

impl Default for PaymasterConfig {
    fn default() -> Self {
        Self {
            lock: Script::default(),
            cell_capacity: DEFAULT_FEE_CELL_CAPACITY,
            preset_count: DEFAULT_PRESET_COUNT,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
            tx_fee: DEFAULT_TX_FEE,
            cell_lease_ttl: DEFAULT_CELL_LEASE_TTL,
            refill_lease_ttl: DEFAULT_REFILL_LEASE_TTL,
        }
    }
}

/// Policy for cells whose required depth is below the recommended
/// reorg-safety depth.
///
/// Whether this should become a hard block is unresolved upstream, so it is
/// an explicit configuration rather than a silent behavior change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    /// Log a warning and unlock anyway.
    #[default]
    Warn,
    /// Exclude the cell from unlocking.
    Defer,
}

/// Time-lock unlocker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockerConfig {
    /// Code hash of the time-lock script.
    pub time_lock_code_hash: H256,
    /// Hash type of the time-lock script.
    pub time_lock_hash_type: ScriptHashType,
    /// Maximum cells unlocked per run.
    pub batch_size: usize,
    /// Interval between runs.
    #[serde(with = "crate::serde::duration")]
    pub interval: Duration,
    /// Policy for below-recommended confirmation depths.
    pub confirmation_policy: ConfirmationPolicy,
    /// Recommended confirmation depth per asset kind. Kinds not listed fall
    /// back to the network default.
    pub recommended_depths: HashMap<AssetKind, u32>,
}

impl Default for UnlockerConfig {
    fn default() -> Self {
        Self {
            time_lock_code_hash: H256::default(),
            time_lock_hash_type: ScriptHashType::Type,
            batch_size: DEFAULT_UNLOCK_BATCH_SIZE,
            interval: DEFAULT_UNLOCK_INTERVAL,
            confirmation_policy: ConfirmationPolicy::default(),
            recommended_depths: HashMap::new(),
        }
    }
}

/// Retry backoff policy for settlement jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", content = "value")]
pub enum BackoffPolicy {
    /// The same delay for every retry.
    Fixed(#[serde(with = "crate::serde::duration")] Duration),
    /// Delay doubling with each attempt.
    Exponential(#[serde(with = "crate::serde::duration")] Duration),
}

impl BackoffPolicy {
    /// Delay before the retry following failed attempt number `attempt`
    /// (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential(base) => {
                // Saturate at 2^16 to keep the multiplication in range.
                let factor = 2u32.saturating_pow(attempt.min(16));
                *base * factor
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential(Duration::from_secs(30))
    }
}

/// Settlement queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delay before a job becomes visible to workers.
    #[serde(with = "crate::serde::duration")]
    pub process_delay: Duration,
    /// Maximum processing attempts per job.
    pub max_attempts: u32,
    /// Retry backoff policy.
    pub backoff: BackoffPolicy,
    /// Number of workers.
    pub concurrency: usize,
    /// Visibility timeout of a claimed job.
    #[serde(with = "crate::serde::duration")]
    pub lease_ttl: Duration,
    /// Interval at which idle workers poll the store.
    #[serde(with = "crate::serde::duration")]
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            process_delay: DEFAULT_PROCESS_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            lease_ttl: DEFAULT_CELL_LEASE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Asset type script code hashes used to classify time-lock cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Code hash of the fungible-token type script.
    pub fungible_code_hash: H256,
    /// Code hash of the NFT/cluster type script.
    pub nft_code_hash: H256,
}

/// Metrics server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address to serve metrics on.
    pub address: IpAddr,
    /// The port to serve metrics on.
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::LOCALHOST), metrics_port: 9000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_yaml_roundtrip() {
        let config = RelayConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let from_yaml = serde_yaml::from_str::<RelayConfig>(&yaml).unwrap();
        assert_eq!(from_yaml.paymaster, config.paymaster);
        assert_eq!(from_yaml.unlocker, config.unlocker);
        assert_eq!(from_yaml.queue, config.queue);
        assert_eq!(from_yaml.bitcoin, config.bitcoin);
    }

    #[test]
    fn backoff_policy_yaml() {
        let s = r#"
backoff:
    type: fixed
    value: 60
        "#;
        let config = serde_yaml::from_str::<QueueConfig>(s).unwrap();
        assert_eq!(config.backoff, BackoffPolicy::Fixed(Duration::from_secs(60)));

        let s = r#"
backoff:
    type: exponential
    value: 30
        "#;
        let config = serde_yaml::from_str::<QueueConfig>(s).unwrap();
        assert_eq!(config.backoff, BackoffPolicy::Exponential(Duration::from_secs(30)));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let backoff = BackoffPolicy::Exponential(Duration::from_secs(30));
        assert_eq!(backoff.delay(0), Duration::from_secs(30));
        assert_eq!(backoff.delay(1), Duration::from_secs(60));
        assert_eq!(backoff.delay(3), Duration::from_secs(240));
    }

    #[test]
    fn fixed_backoff_is_flat() {
        let backoff = BackoffPolicy::Fixed(Duration::from_secs(10));
        assert_eq!(backoff.delay(0), backoff.delay(5));
    }

    #[test]
    fn confirmation_policy_yaml() {
        let s = r#"
confirmation_policy: defer
recommended_depths:
    fungible: 6
    nft: 12
        "#;
        let config = serde_yaml::from_str::<UnlockerConfig>(s).unwrap();
        assert_eq!(config.confirmation_policy, ConfirmationPolicy::Defer);
        assert_eq!(config.recommended_depths[&AssetKind::Nft], 12);
    }
}
