//! Outbox storage contract.

use super::models::{MessageDisposition, NewOutboxMessage, OutboxMessage, OutboxMessageId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Outbox storage errors
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OutboxResult<T> = Result<T, OutboxError>;

/// Append-only store of pending domain events.
///
/// `claim_due` must be atomic: of any number of concurrent claimers, exactly
/// one observes a given due row, and claimed rows are already marked
/// `Processing` when returned. That single guarantee is what makes per-row
/// pessimistic locking unnecessary downstream.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append rows in `Pending` status. Used directly by tests and by stores
    /// whose save pipeline is not SQL-transactional; the Postgres tournament
    /// store appends inside its own transaction instead.
    async fn append(&self, messages: Vec<NewOutboxMessage>) -> OutboxResult<()>;

    /// Atomically claim up to `batch_size` due rows (`Pending` or `Failed`,
    /// under the retry ceiling, `scheduled_at <= now`), mark them
    /// `Processing`, and return them in `occurred_at` order.
    async fn claim_due(
        &self,
        batch_size: i64,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> OutboxResult<Vec<OutboxMessage>>;

    /// Persist the fate of every message in a claimed batch in one write.
    async fn persist_outcomes(&self, dispositions: &[MessageDisposition]) -> OutboxResult<()>;

    /// Fetch one row (operator inspection, tests).
    async fn get(&self, id: OutboxMessageId) -> OutboxResult<Option<OutboxMessage>>;

    /// Most recent dead-lettered rows for operator inspection.
    async fn dead_letters(&self, limit: i64) -> OutboxResult<Vec<OutboxMessage>>;
}
