//! Relay queue storage.

mod api;
pub use api::{Job, JobState, StorageApi, StorageError};

mod memory;
mod pg;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};

/// Relay storage interface.
#[derive(Debug, Clone)]
pub struct RelayStorage {
    inner: Arc<dyn StorageApi>,
}

impl RelayStorage {
    /// Create [`RelayStorage`] with an in-memory backend. Used for testing
    /// only.
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(memory::InMemoryStorage::default()) }
    }

    /// Create [`RelayStorage`] backed by PostgreSQL.
    pub fn pg(pool: PgPool) -> Self {
        Self { inner: Arc::new(pg::PgStorage::new(pool)) }
    }
}

#[async_trait::async_trait]
impl StorageApi for RelayStorage {
    async fn enqueue(
        &self,
        queue: &str,
        id: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> api::Result<bool> {
        self.inner.enqueue(queue, id, payload, available_at).await
    }

    async fn claim(&self, queue: &str, lessee: &str, lease: Duration) -> api::Result<Option<Job>> {
        self.inner.claim(queue, lessee, lease).await
    }

    async fn complete(&self, queue: &str, id: &str) -> api::Result<()> {
        self.inner.complete(queue, id).await
    }

    async fn retry(&self, queue: &str, id: &str, available_at: DateTime<Utc>) -> api::Result<u32> {
        self.inner.retry(queue, id, available_at).await
    }

    async fn fail(&self, queue: &str, id: &str) -> api::Result<()> {
        self.inner.fail(queue, id).await
    }

    async fn release(&self, queue: &str, id: &str) -> api::Result<()> {
        self.inner.release(queue, id).await
    }

    async fn get(&self, queue: &str, id: &str) -> api::Result<Option<Job>> {
        self.inner.get(queue, id).await
    }

    async fn waiting_count(&self, queue: &str) -> api::Result<usize> {
        self.inner.waiting_count(queue).await
    }

    async fn contains(&self, queue: &str, id: &str) -> api::Result<bool> {
        self.inner.contains(queue, id).await
    }

    async fn try_acquire_lease(&self, name: &str, ttl: Duration) -> api::Result<bool> {
        self.inner.try_acquire_lease(name, ttl).await
    }

    async fn release_lease(&self, name: &str) -> api::Result<()> {
        self.inner.release_lease(name).await
    }
}
