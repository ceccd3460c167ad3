//! Queue storage implementation in-memory. For testing only.

use super::api::{Job, JobState, Result, StorageApi, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

/// [`StorageApi`] implementation in-memory. Used for testing.
///
/// All state sits behind one mutex: claim-next has to pick and mark a job in
/// one step, which rules out per-entry locking.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, Vec<Job>>,
    leases: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    fn job_mut(&mut self, queue: &str, id: &str) -> Result<&mut Job> {
        self.queues
            .get_mut(queue)
            .and_then(|jobs| jobs.iter_mut().find(|job| job.id == id))
            .ok_or_else(|| StorageError::JobNotFound { queue: queue.into(), id: id.into() })
    }
}

fn is_due(job: &Job, now: DateTime<Utc>) -> bool {
    match job.state {
        JobState::Waiting | JobState::Delayed => job.available_at <= now,
        JobState::Active => job.lease_expires_at.is_some_and(|expiry| expiry <= now),
        JobState::Completed | JobState::Failed => false,
    }
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn enqueue(
        &self,
        queue: &str,
        id: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let jobs = inner.queues.entry(queue.into()).or_default();
        if jobs.iter().any(|job| job.id == id) {
            return Ok(false);
        }

        let state =
            if available_at > Utc::now() { JobState::Delayed } else { JobState::Waiting };
        jobs.push(Job {
            id: id.into(),
            payload,
            attempts: 0,
            available_at,
            state,
            leased_by: None,
            lease_expires_at: None,
        });
        Ok(true)
    }

    async fn claim(&self, queue: &str, lessee: &str, lease: Duration) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let Some(jobs) = inner.queues.get_mut(queue) else { return Ok(None) };

        // An existing live lease for this lessee is reused, not re-claimed.
        if let Some(job) = jobs.iter().find(|job| {
            job.state == JobState::Active
                && job.leased_by.as_deref() == Some(lessee)
                && job.lease_expires_at.is_some_and(|expiry| expiry > now)
        }) {
            return Ok(Some(job.clone()));
        }

        let due = jobs
            .iter_mut()
            .filter(|job| is_due(job, now))
            .min_by(|a, b| (a.available_at, &a.id).cmp(&(b.available_at, &b.id)));

        Ok(due.map(|job| {
            job.state = JobState::Active;
            job.leased_by = Some(lessee.into());
            job.lease_expires_at = Some(now + lease);
            job.clone()
        }))
    }

    async fn complete(&self, queue: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.job_mut(queue, id)?;
        job.state = JobState::Completed;
        job.leased_by = None;
        job.lease_expires_at = None;
        Ok(())
    }

    async fn retry(&self, queue: &str, id: &str, available_at: DateTime<Utc>) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.job_mut(queue, id)?;
        job.attempts += 1;
        job.available_at = available_at;
        job.state = JobState::Delayed;
        job.leased_by = None;
        job.lease_expires_at = None;
        Ok(job.attempts)
    }

    async fn fail(&self, queue: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.job_mut(queue, id)?;
        job.state = JobState::Failed;
        job.leased_by = None;
        job.lease_expires_at = None;
        Ok(())
    }

    async fn release(&self, queue: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.job_mut(queue, id)?;
        job.state = JobState::Waiting;
        job.available_at = Utc::now();
        job.leased_by = None;
        job.lease_expires_at = None;
        Ok(())
    }

    async fn get(&self, queue: &str, id: &str) -> Result<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .queues
            .get(queue)
            .and_then(|jobs| jobs.iter().find(|job| job.id == id))
            .cloned())
    }

    async fn waiting_count(&self, queue: &str) -> Result<usize> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .queues
            .get(queue)
            .map(|jobs| {
                jobs.iter()
                    .filter(|job| {
                        matches!(job.state, JobState::Waiting | JobState::Delayed)
                            || is_due(job, now)
                    })
                    .count()
            })
            .unwrap_or_default())
    }

    async fn contains(&self, queue: &str, id: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.queues.get(queue).is_some_and(|jobs| jobs.iter().any(|job| job.id == id)))
    }

    async fn try_acquire_lease(&self, name: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        match inner.leases.get(name) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                inner.leases.insert(name.into(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, name: &str) -> Result<()> {
        self.inner.lock().unwrap().leases.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_enqueue_is_noop() {
        let storage = InMemoryStorage::default();
        assert!(storage.enqueue("q", "a", json!(1), Utc::now()).await.unwrap());
        assert!(!storage.enqueue("q", "a", json!(2), Utc::now()).await.unwrap());

        let job = storage.get("q", "a").await.unwrap().unwrap();
        assert_eq!(job.payload, json!(1));
    }

    #[tokio::test]
    async fn delayed_job_not_claimable_early() {
        let storage = InMemoryStorage::default();
        storage
            .enqueue("q", "a", json!(1), Utc::now() + chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert!(storage.claim("q", "w", Duration::from_secs(30)).await.unwrap().is_none());
        assert_eq!(storage.waiting_count("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_reuses_live_lease() {
        let storage = InMemoryStorage::default();
        storage.enqueue("q", "a", json!(1), Utc::now()).await.unwrap();
        storage.enqueue("q", "b", json!(2), Utc::now()).await.unwrap();

        let first = storage.claim("q", "token", Duration::from_secs(30)).await.unwrap().unwrap();
        let again = storage.claim("q", "token", Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let storage = InMemoryStorage::default();
        storage.enqueue("q", "a", json!(1), Utc::now()).await.unwrap();

        let job = storage.claim("q", "x", Duration::from_secs(0)).await.unwrap().unwrap();
        assert_eq!(job.id, "a");

        // Zero-length lease: immediately expired, so another lessee gets it.
        let job = storage.claim("q", "y", Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(job.id, "a");
        assert_eq!(job.leased_by.as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn completed_job_never_reclaimed() {
        let storage = InMemoryStorage::default();
        storage.enqueue("q", "a", json!(1), Utc::now()).await.unwrap();
        storage.claim("q", "x", Duration::from_secs(30)).await.unwrap().unwrap();
        storage.complete("q", "a").await.unwrap();

        assert!(storage.claim("q", "y", Duration::from_secs(30)).await.unwrap().is_none());
        assert!(storage.contains("q", "a").await.unwrap());
        assert_eq!(storage.waiting_count("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lease_ttl_expires() {
        let storage = InMemoryStorage::default();
        assert!(storage.try_acquire_lease("refill", Duration::from_secs(60)).await.unwrap());
        assert!(!storage.try_acquire_lease("refill", Duration::from_secs(60)).await.unwrap());

        storage.release_lease("refill").await.unwrap();
        assert!(storage.try_acquire_lease("refill", Duration::from_secs(0)).await.unwrap());
        // TTL of zero: already expired, acquirable by the next caller.
        assert!(storage.try_acquire_lease("refill", Duration::from_secs(60)).await.unwrap());
    }
}
