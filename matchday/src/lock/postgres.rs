//! Postgres-backed lock table.
//!
//! The acquire path is a single upsert statement so that "check expiry" and
//! "take the key" cannot interleave with a competing writer. Expired rows are
//! stolen in place rather than garbage-collected.

use super::backend::{LockBackend, LockResult};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Lock backend persisted in the `distributed_locks` table.
pub struct PgLockBackend {
    pool: Arc<PgPool>,
}

impl PgLockBackend {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockBackend for PgLockBackend {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LockResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO distributed_locks (lock_key, holder, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
            SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
            WHERE distributed_locks.expires_at <= NOW()
            "#,
        )
        .bind(key)
        .bind(holder)
        .bind(ttl.as_secs_f64())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &str, holder: &str) -> LockResult<bool> {
        let result = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND holder = $2")
            .bind(key)
            .bind(holder)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
