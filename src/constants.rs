//! Relay constants.

use std::time::Duration;

/// Capacity of a single fee cell, in shannons (316 CKB).
///
/// Fee cells are identical fixed-capacity cells so that leasing any one of
/// them is equivalent; the refill scan matches on this exact capacity.
pub const DEFAULT_FEE_CELL_CAPACITY: u64 = 316 * 100_000_000;

/// Number of fee cells the pool aims to keep waiting.
pub const DEFAULT_PRESET_COUNT: usize = 500;

/// Fraction of the preset count below which a refill is triggered.
pub const DEFAULT_REFILL_THRESHOLD: f64 = 0.3;

/// Flat transaction fee paid from the appended fee cell, in shannons.
pub const DEFAULT_TX_FEE: u64 = 10_000;

/// How long a leased fee cell stays invisible before it returns to the pool.
///
/// Must comfortably exceed the worst-case sign-and-broadcast round trip so a
/// live lease is never reclaimed under its holder.
pub const DEFAULT_CELL_LEASE_TTL: Duration = Duration::from_secs(300);

/// TTL on the refill lease, so a crashed refill cannot wedge the allocator.
pub const DEFAULT_REFILL_LEASE_TTL: Duration = Duration::from_secs(60);

/// Maximum number of time-lock cells unlocked per run.
pub const DEFAULT_UNLOCK_BATCH_SIZE: usize = 100;

/// Interval between unlocker runs.
pub const DEFAULT_UNLOCK_INTERVAL: Duration = Duration::from_secs(300);

/// Confirmation depth below which unlocking is considered reorg-unsafe.
pub const RECOMMENDED_CONFIRMATION_DEPTH: u32 = 6;

/// Delay before a settlement job becomes visible to workers, giving the
/// referenced Bitcoin transaction time to propagate to the data provider.
pub const DEFAULT_PROCESS_DELAY: Duration = Duration::from_secs(120);

/// Maximum processing attempts per settlement job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Number of settlement workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Interval at which idle settlement workers poll the store for due jobs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Page size for the paginated cell collector.
pub const CELL_COLLECT_PAGE_SIZE: usize = 50;

/// Queue name for the fee-cell pool.
pub const FEE_CELL_QUEUE: &str = "paymaster-cells";

/// Queue name for settlement jobs.
pub const SETTLEMENT_QUEUE: &str = "settlement";

/// Name of the store lease guarding refills.
pub const REFILL_LEASE: &str = "paymaster-refill";
