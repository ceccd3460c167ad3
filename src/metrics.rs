//! Relay metrics.

use eyre::WrapErr;
use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Installs a Prometheus exporter serving scrapes on `addr`.
///
/// Must be called from within a tokio runtime; the exporter spawns its own
/// listener and upkeep tasks.
pub fn serve_exporter(addr: SocketAddr) -> eyre::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .wrap_err("failed to install metrics exporter")
}

/// Metrics for the [`Paymaster`](crate::paymaster::Paymaster).
#[derive(Metrics)]
#[metrics(scope = "paymaster")]
pub struct PaymasterMetrics {
    /// Number of fee cells leased.
    pub leased: Counter,
    /// Number of fee cells newly enqueued by refills.
    pub refilled: Counter,
    /// Number of refills that ended short of the preset count.
    pub short_refills: Counter,
    /// Number of lease requests that found the pool exhausted.
    pub exhausted: Counter,
    /// Number of fee cells permanently retired after confirmed use.
    pub spent: Counter,
    /// Cells currently waiting in the pool.
    pub waiting: Gauge,
}

/// Metrics for the [`SettlementQueue`](crate::settlement::SettlementQueue).
#[derive(Metrics)]
#[metrics(scope = "settlement")]
pub struct SettlementMetrics {
    /// Number of jobs accepted.
    pub enqueued: Counter,
    /// Number of jobs completed.
    pub completed: Counter,
    /// Number of retryable job failures.
    pub retried: Counter,
    /// Number of jobs that reached terminal failure.
    pub failed: Counter,
    /// Jobs currently being processed.
    pub active: Gauge,
    /// Time from claim to completion, in milliseconds.
    pub processing_time: Histogram,
}

/// Metrics for the [`Unlocker`](crate::unlocker::Unlocker).
#[derive(Metrics)]
#[metrics(scope = "unlocker")]
pub struct UnlockerMetrics {
    /// Number of unlock runs.
    pub runs: Counter,
    /// Number of cells unlocked.
    pub unlocked: Counter,
    /// Number of unlock transactions submitted.
    pub submitted: Counter,
    /// Number of cells below the recommended confirmation depth that were
    /// still unlocked (warn policy).
    pub below_recommended: Counter,
    /// Number of cells deferred by the confirmation policy.
    pub deferred: Counter,
}
