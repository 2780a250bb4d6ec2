//! Postgres idempotency store.

use super::models::{IdempotencyStatus, IdempotentRequest};
use super::store::{IdempotencyError, IdempotencyResult, IdempotencyStore, InsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Request records persisted in the `idempotent_requests` table, unique on
/// `(idem_key, route)`.
pub struct PgIdempotencyStore {
    pool: Arc<PgPool>,
}

impl PgIdempotencyStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn row_to_request(row: &sqlx::postgres::PgRow) -> IdempotentRequest {
        let status_str: String = row.get("status");
        IdempotentRequest {
            key: row.get("idem_key"),
            route: row.get("route"),
            request_hash: row.get("request_hash"),
            status: IdempotencyStatus::parse(&status_str).unwrap_or(IdempotencyStatus::Failed),
            status_code: row.get("status_code"),
            response_body: row.get("response_body"),
            created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
            completed_at: row
                .get::<Option<chrono::NaiveDateTime>, _>("completed_at")
                .map(|dt| dt.and_utc()),
        }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn insert_if_absent(
        &self,
        key: &str,
        route: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<InsertOutcome> {
        // ON CONFLICT DO NOTHING makes the concurrent-duplicate race safe:
        // the loser's insert affects zero rows and it reads the winner's row.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotent_requests (idem_key, route, request_hash, status, created_at)
            VALUES ($1, $2, $3, 'in_progress', $4)
            ON CONFLICT (idem_key, route) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(route)
        .bind(request_hash)
        .bind(now.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        match self.get(key, route).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(IdempotencyError::Inconsistent(key.to_string())),
        }
    }

    async fn restart_failed(
        &self,
        key: &str,
        route: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE idempotent_requests
            SET status = 'in_progress', created_at = $3,
                status_code = NULL, response_body = NULL, completed_at = NULL
            WHERE idem_key = $1 AND route = $2 AND status = 'failed'
            "#,
        )
        .bind(key)
        .bind(route)
        .bind(now.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        key: &str,
        route: &str,
        status_code: i32,
        response_body: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<()> {
        sqlx::query(
            r#"
            UPDATE idempotent_requests
            SET status = 'completed', status_code = $3, response_body = $4, completed_at = $5
            WHERE idem_key = $1 AND route = $2
            "#,
        )
        .bind(key)
        .bind(route)
        .bind(status_code)
        .bind(response_body)
        .bind(now.naive_utc())
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn fail(&self, key: &str, route: &str, now: DateTime<Utc>) -> IdempotencyResult<()> {
        sqlx::query(
            r#"
            UPDATE idempotent_requests
            SET status = 'failed', completed_at = $3
            WHERE idem_key = $1 AND route = $2
            "#,
        )
        .bind(key)
        .bind(route)
        .bind(now.naive_utc())
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str, route: &str) -> IdempotencyResult<Option<IdempotentRequest>> {
        let row = sqlx::query(
            r#"
            SELECT idem_key, route, request_hash, status, status_code, response_body,
                   created_at, completed_at
            FROM idempotent_requests
            WHERE idem_key = $1 AND route = $2
            "#,
        )
        .bind(key)
        .bind(route)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(Self::row_to_request))
    }
}
