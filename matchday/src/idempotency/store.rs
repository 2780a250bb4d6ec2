//! Idempotency storage contract.

use super::models::IdempotentRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Idempotency storage errors
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("idempotency row vanished for key `{0}`")]
    Inconsistent(String),
}

pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Result of the insert-if-absent step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A fresh `InProgress` row was inserted; the caller may execute.
    Inserted,
    /// A row already exists; the caller decides from its status and hash.
    Existing(IdempotentRequest),
}

/// Unique `(key, route)` request records.
///
/// `insert_if_absent` must be atomic against concurrent inserts of the same
/// key: of two racers exactly one gets `Inserted`, the other sees the winner's
/// row.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn insert_if_absent(
        &self,
        key: &str,
        route: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<InsertOutcome>;

    /// Flip a `Failed` row back to `InProgress` so an identical retry can
    /// re-execute. Returns whether this caller won the flip.
    async fn restart_failed(
        &self,
        key: &str,
        route: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<bool>;

    /// Store the final response and mark the row `Completed`.
    async fn complete(
        &self,
        key: &str,
        route: &str,
        status_code: i32,
        response_body: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<()>;

    /// Mark the row `Failed` (the request errored; a retry may re-execute).
    async fn fail(&self, key: &str, route: &str, now: DateTime<Utc>) -> IdempotencyResult<()>;

    async fn get(&self, key: &str, route: &str) -> IdempotencyResult<Option<IdempotentRequest>>;
}
