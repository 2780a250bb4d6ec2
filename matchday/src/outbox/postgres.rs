//! Postgres outbox store.

use super::models::{
    MessageDisposition, NewOutboxMessage, OutboxMessage, OutboxMessageId, OutboxStatus,
};
use super::store::{OutboxResult, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

/// Outbox rows persisted in the `outbox_messages` table.
pub struct PgOutboxStore {
    pool: Arc<PgPool>,
}

impl PgOutboxStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Append rows inside a caller-owned transaction. This is the hook the
    /// tournament store uses to keep event rows in the same atomic unit as
    /// the entity writes.
    pub async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        messages: &[NewOutboxMessage],
    ) -> Result<(), sqlx::Error> {
        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO outbox_messages
                    (event_type, payload, status, occurred_at, scheduled_at, retry_count)
                VALUES ($1, $2, 'pending', $3, $3, 0)
                "#,
            )
            .bind(&message.event_type)
            .bind(&message.payload)
            .bind(message.occurred_at.naive_utc())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    fn row_to_message(row: &sqlx::postgres::PgRow) -> OutboxMessage {
        let status_str: String = row.get("status");
        OutboxMessage {
            id: row.get("id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            status: OutboxStatus::parse(&status_str).unwrap_or(OutboxStatus::DeadLetter),
            occurred_at: row.get::<chrono::NaiveDateTime, _>("occurred_at").and_utc(),
            scheduled_at: row
                .get::<chrono::NaiveDateTime, _>("scheduled_at")
                .and_utc(),
            retry_count: row.get("retry_count"),
            last_error: row.get("last_error"),
            processed_at: row
                .get::<Option<chrono::NaiveDateTime>, _>("processed_at")
                .map(|dt| dt.and_utc()),
        }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn append(&self, messages: Vec<NewOutboxMessage>) -> OutboxResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::append_in_tx(&mut tx, &messages).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn claim_due(
        &self,
        batch_size: i64,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> OutboxResult<Vec<OutboxMessage>> {
        // Claim and mark in one statement. SKIP LOCKED makes a concurrent
        // claimer see an empty result instead of blocking or double-claiming.
        let rows = sqlx::query(
            r#"
            UPDATE outbox_messages SET status = 'processing'
            WHERE id IN (
                SELECT id FROM outbox_messages
                WHERE status IN ('pending', 'failed')
                  AND retry_count < $1
                  AND scheduled_at <= $2
                ORDER BY occurred_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_type, payload, status, occurred_at, scheduled_at,
                      retry_count, last_error, processed_at
            "#,
        )
        .bind(max_retries)
        .bind(now.naive_utc())
        .bind(batch_size)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut messages: Vec<OutboxMessage> = rows.iter().map(Self::row_to_message).collect();
        messages.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn persist_outcomes(&self, dispositions: &[MessageDisposition]) -> OutboxResult<()> {
        let mut tx = self.pool.begin().await?;
        for disposition in dispositions {
            sqlx::query(
                r#"
                UPDATE outbox_messages
                SET status = $2, retry_count = $3, scheduled_at = $4,
                    last_error = $5, processed_at = $6
                WHERE id = $1
                "#,
            )
            .bind(disposition.id)
            .bind(disposition.status.as_str())
            .bind(disposition.retry_count)
            .bind(disposition.scheduled_at.naive_utc())
            .bind(&disposition.last_error)
            .bind(disposition.processed_at.map(|dt| dt.naive_utc()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OutboxMessageId) -> OutboxResult<Option<OutboxMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, payload, status, occurred_at, scheduled_at,
                   retry_count, last_error, processed_at
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(Self::row_to_message))
    }

    async fn dead_letters(&self, limit: i64) -> OutboxResult<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, status, occurred_at, scheduled_at,
                   retry_count, last_error, processed_at
            FROM outbox_messages
            WHERE status = 'dead_letter'
            ORDER BY occurred_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(Self::row_to_message).collect())
    }
}
