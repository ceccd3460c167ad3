//! Queue storage api.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, time::Duration};

/// Type alias for `Result<T, StorageError>`.
pub type Result<T> = core::result::Result<T, StorageError>;

/// Errors returned by the queue store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The referenced job does not exist.
    #[error("job {queue}/{id} not found")]
    JobNotFound {
        /// Queue name.
        queue: String,
        /// Job id.
        id: String,
    },

    /// Database failure.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Payload (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// State of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Claimable now.
    Waiting,
    /// Not claimable before `available_at`.
    Delayed,
    /// Claimed by a lessee; invisible until the lease expires.
    Active,
    /// Terminally done. Kept as a tombstone so the id is never re-enqueued.
    Completed,
    /// Terminally failed after exhausting its attempts.
    Failed,
}

impl JobState {
    /// Returns the state's store representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its store representation.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "waiting" => Self::Waiting,
            "delayed" => Self::Delayed,
            "active" => Self::Active,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => return None,
        })
    }
}

/// A job held by the store.
///
/// The `(queue, id)` pair is the idempotency key: enqueueing an id twice is a
/// no-op regardless of the job's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Idempotency key within the queue.
    pub id: String,
    /// Serialized payload.
    pub payload: serde_json::Value,
    /// Number of failed processing attempts so far.
    pub attempts: u32,
    /// Earliest claimable time.
    pub available_at: DateTime<Utc>,
    /// Current state.
    pub state: JobState,
    /// Current lessee, while active.
    pub leased_by: Option<String>,
    /// When the current lease expires back to waiting.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Durable queue storage.
///
/// The atomic claim (exactly one lessee receives a given job id at a time) is
/// the correctness boundary for the never-double-lease invariant, across
/// processes sharing the store. Expired leases become claimable again without
/// any background reaper: expiry is checked at claim time.
#[async_trait]
pub trait StorageApi: Debug + Send + Sync {
    /// Inserts a job unless the id already exists in any state.
    ///
    /// Returns `false` for a duplicate id.
    async fn enqueue(
        &self,
        queue: &str,
        id: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Atomically claims a job for `lessee` with the given lease duration.
    ///
    /// If `lessee` already holds a live lease in this queue, that same job is
    /// returned again instead of a new one being claimed; repeated attempts
    /// for one token therefore reuse one lease. Otherwise the oldest due job
    /// (waiting, delayed-and-due, or active with an expired lease) is claimed.
    async fn claim(&self, queue: &str, lessee: &str, lease: Duration) -> Result<Option<Job>>;

    /// Permanently completes a job. Idempotent.
    async fn complete(&self, queue: &str, id: &str) -> Result<()>;

    /// Re-delays a job after a failed attempt, incrementing its attempt
    /// count. Returns the new count.
    async fn retry(&self, queue: &str, id: &str, available_at: DateTime<Utc>) -> Result<u32>;

    /// Terminally fails a job.
    async fn fail(&self, queue: &str, id: &str) -> Result<()>;

    /// Returns a leased job to waiting without counting an attempt.
    async fn release(&self, queue: &str, id: &str) -> Result<()>;

    /// Reads a job.
    async fn get(&self, queue: &str, id: &str) -> Result<Option<Job>>;

    /// Number of claimable-or-pending jobs: waiting, delayed, or active with
    /// an expired lease.
    async fn waiting_count(&self, queue: &str) -> Result<usize>;

    /// Whether the id exists in any state, tombstones included.
    async fn contains(&self, queue: &str, id: &str) -> Result<bool>;

    /// Acquires a named lease with a TTL, returning `false` if it is held.
    ///
    /// An expired lease is acquirable again, so a crashed holder cannot wedge
    /// the operation it guarded.
    async fn try_acquire_lease(&self, name: &str, ttl: Duration) -> Result<bool>;

    /// Releases a named lease. Idempotent.
    async fn release_lease(&self, name: &str) -> Result<()>;
}
