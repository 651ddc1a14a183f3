//! One scoring run per (as-of date, input extracts) at a time.
//!
//! The advisory lock is session-scoped, so [`ScoringLock`] pins the pool connection that took
//! it. Releasing unlocks on that same connection. A guard dropped without [`ScoringLock::release`]
//! (an error path) detaches the connection from the pool; closing it ends the session and
//! Postgres frees the lock.

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use std::path::Path;
use uuid::Uuid;

const LOCK_NAMESPACE: Uuid = Uuid::from_u128(0x7d0c_5f2e_3a41_4b8e_9c6d_2e1f_0a5b_c391);

/// Advisory lock key for scoring `as_of_date` from the given client and price extracts.
pub fn scoring_lock_key(as_of_date: NaiveDate, client_data: &Path, price_data: &Path) -> i64 {
    let name = format!(
        "{as_of_date}\0{}\0{}",
        client_data.display(),
        price_data.display()
    );
    let (hi, lo) = Uuid::new_v5(&LOCK_NAMESPACE, name.as_bytes()).as_u64_pair();
    (hi ^ lo) as i64
}

#[derive(Debug)]
pub struct ScoringLock {
    key: i64,
    conn: Option<PoolConnection<Postgres>>,
}

impl ScoringLock {
    /// `None` when another session holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool, key: i64) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for advisory lock")?;

        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

        Ok(acquired.0.then(|| Self {
            key,
            conn: Some(conn),
        }))
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .execute(&mut *conn)
            .await;
        if unlocked.is_err() {
            drop(conn.detach());
        }
        unlocked.with_context(|| format!("failed to release advisory lock (key={})", self.key))?;
        Ok(())
    }
}

impl Drop for ScoringLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                key = self.key,
                "scoring lock dropped unreleased; closing its session"
            );
            drop(conn.detach());
        }
    }
}
