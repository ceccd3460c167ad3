//! Queue storage implementation using a PostgreSQL database.
//!
//! `FOR UPDATE SKIP LOCKED` on the claim query is the atomic job-claim
//! primitive that lets a long-running worker and a time-boxed periodic
//! invocation share the store without double-processing a job.

use super::api::{Job, JobState, Result, StorageApi, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;

/// PostgreSQL storage implementation.
#[derive(Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Creates a new PostgreSQL storage instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: PgRow) -> Result<Job> {
    let state: String = row.try_get("state").map_err(StorageError::Database)?;
    let state = JobState::parse(&state).ok_or_else(|| {
        StorageError::Database(sqlx::Error::Decode(format!("unknown job state {state:?}").into()))
    })?;

    Ok(Job {
        id: row.try_get("id").map_err(StorageError::Database)?,
        payload: row.try_get("payload").map_err(StorageError::Database)?,
        attempts: row.try_get::<i32, _>("attempts").map_err(StorageError::Database)? as u32,
        available_at: row.try_get("available_at").map_err(StorageError::Database)?,
        state,
        leased_by: row.try_get("leased_by").map_err(StorageError::Database)?,
        lease_expires_at: row.try_get("lease_expires_at").map_err(StorageError::Database)?,
    })
}

const JOB_COLUMNS: &str = "id, payload, attempts, available_at, state, leased_by, lease_expires_at";

#[async_trait]
impl StorageApi for PgStorage {
    async fn enqueue(
        &self,
        queue: &str,
        id: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> Result<bool> {
        let state =
            if available_at > Utc::now() { JobState::Delayed } else { JobState::Waiting };
        let result = sqlx::query(
            "insert into relay_jobs (queue, id, payload, attempts, available_at, state) \
             values ($1, $2, $3, 0, $4, $5) \
             on conflict (queue, id) do nothing",
        )
        .bind(queue)
        .bind(id)
        .bind(payload)
        .bind(available_at)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim(&self, queue: &str, lessee: &str, lease: Duration) -> Result<Option<Job>> {
        // An existing live lease for this lessee is reused, not re-claimed.
        let existing = sqlx::query(&format!(
            "select {JOB_COLUMNS} from relay_jobs \
             where queue = $1 and leased_by = $2 and state = 'active' \
               and lease_expires_at > now()",
        ))
        .bind(queue)
        .bind(lessee)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(Some(job_from_row(row)?));
        }

        let claimed = sqlx::query(&format!(
            "update relay_jobs \
             set state = 'active', leased_by = $2, lease_expires_at = $3 \
             where (queue, id) in ( \
               select queue, id from relay_jobs \
               where queue = $1 and ( \
                 (state in ('waiting', 'delayed') and available_at <= now()) \
                 or (state = 'active' and lease_expires_at <= now())) \
               order by available_at, id \
               limit 1 \
               for update skip locked) \
             returning {JOB_COLUMNS}",
        ))
        .bind(queue)
        .bind(lessee)
        .bind(Utc::now() + lease)
        .fetch_optional(&self.pool)
        .await?;

        claimed.map(job_from_row).transpose()
    }

    async fn complete(&self, queue: &str, id: &str) -> Result<()> {
        sqlx::query(
            "update relay_jobs \
             set state = 'completed', leased_by = null, lease_expires_at = null \
             where queue = $1 and id = $2",
        )
        .bind(queue)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn retry(&self, queue: &str, id: &str, available_at: DateTime<Utc>) -> Result<u32> {
        let row = sqlx::query(
            "update relay_jobs \
             set attempts = attempts + 1, state = 'delayed', available_at = $3, \
                 leased_by = null, lease_expires_at = null \
             where queue = $1 and id = $2 \
             returning attempts",
        )
        .bind(queue)
        .bind(id)
        .bind(available_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::JobNotFound { queue: queue.into(), id: id.into() })?;

        Ok(row.try_get::<i32, _>("attempts").map_err(StorageError::Database)? as u32)
    }

    async fn fail(&self, queue: &str, id: &str) -> Result<()> {
        sqlx::query(
            "update relay_jobs \
             set state = 'failed', leased_by = null, lease_expires_at = null \
             where queue = $1 and id = $2",
        )
        .bind(queue)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(&self, queue: &str, id: &str) -> Result<()> {
        sqlx::query(
            "update relay_jobs \
             set state = 'waiting', available_at = now(), \
                 leased_by = null, lease_expires_at = null \
             where queue = $1 and id = $2",
        )
        .bind(queue)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, queue: &str, id: &str) -> Result<Option<Job>> {
        let row =
            sqlx::query(&format!("select {JOB_COLUMNS} from relay_jobs where queue = $1 and id = $2"))
                .bind(queue)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(job_from_row).transpose()
    }

    async fn waiting_count(&self, queue: &str) -> Result<usize> {
        let row = sqlx::query(
            "select count(*) as count from relay_jobs \
             where queue = $1 and ( \
               state in ('waiting', 'delayed') \
               or (state = 'active' and lease_expires_at <= now()))",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("count").map_err(StorageError::Database)? as usize)
    }

    async fn contains(&self, queue: &str, id: &str) -> Result<bool> {
        let row = sqlx::query(
            "select exists(select 1 from relay_jobs where queue = $1 and id = $2) as found",
        )
        .bind(queue)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("found").map_err(StorageError::Database)?)
    }

    async fn try_acquire_lease(&self, name: &str, ttl: Duration) -> Result<bool> {
        // Upsert-if-expired: the conflict branch only fires when the held
        // lease has lapsed, so exactly one caller wins a live lease.
        let row = sqlx::query(
            "insert into relay_leases (name, expires_at) values ($1, $2) \
             on conflict (name) do update set expires_at = excluded.expires_at \
             where relay_leases.expires_at <= now() \
             returning name",
        )
        .bind(name)
        .bind(Utc::now() + ttl)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn release_lease(&self, name: &str) -> Result<()> {
        sqlx::query("delete from relay_leases where name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
