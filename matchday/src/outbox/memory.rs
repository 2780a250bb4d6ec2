//! In-memory outbox store for single-node deployments and tests.

use super::models::{
    MessageDisposition, NewOutboxMessage, OutboxMessage, OutboxMessageId, OutboxStatus,
};
use super::store::{OutboxResult, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    messages: Vec<OutboxMessage>,
    next_id: OutboxMessageId,
}

/// Outbox rows held in process memory behind one mutex, so a claim is exactly
/// as atomic as the database implementation's single-statement claim.
#[derive(Default)]
pub struct MemoryOutboxStore {
    inner: Mutex<Inner>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for inspection in tests.
    pub async fn snapshot(&self) -> Vec<OutboxMessage> {
        self.inner.lock().await.messages.clone()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn append(&self, messages: Vec<NewOutboxMessage>) -> OutboxResult<()> {
        let mut inner = self.inner.lock().await;
        for message in messages {
            inner.next_id += 1;
            let id = inner.next_id;
            inner.messages.push(OutboxMessage {
                id,
                event_type: message.event_type,
                payload: message.payload,
                status: OutboxStatus::Pending,
                occurred_at: message.occurred_at,
                scheduled_at: message.occurred_at,
                retry_count: 0,
                last_error: None,
                processed_at: None,
            });
        }
        Ok(())
    }

    async fn claim_due(
        &self,
        batch_size: i64,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> OutboxResult<Vec<OutboxMessage>> {
        let mut inner = self.inner.lock().await;

        let mut due: Vec<usize> = inner
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                matches!(m.status, OutboxStatus::Pending | OutboxStatus::Failed)
                    && m.retry_count < max_retries
                    && m.scheduled_at <= now
            })
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| (inner.messages[i].occurred_at, inner.messages[i].id));
        due.truncate(batch_size.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for i in due {
            inner.messages[i].status = OutboxStatus::Processing;
            claimed.push(inner.messages[i].clone());
        }
        Ok(claimed)
    }

    async fn persist_outcomes(&self, dispositions: &[MessageDisposition]) -> OutboxResult<()> {
        let mut inner = self.inner.lock().await;
        for disposition in dispositions {
            if let Some(message) = inner.messages.iter_mut().find(|m| m.id == disposition.id) {
                message.status = disposition.status;
                message.retry_count = disposition.retry_count;
                message.scheduled_at = disposition.scheduled_at;
                message.last_error = disposition.last_error.clone();
                message.processed_at = disposition.processed_at;
            }
        }
        Ok(())
    }

    async fn get(&self, id: OutboxMessageId) -> OutboxResult<Option<OutboxMessage>> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn dead_letters(&self, limit: i64) -> OutboxResult<Vec<OutboxMessage>> {
        let inner = self.inner.lock().await;
        let mut dead: Vec<OutboxMessage> = inner
            .messages
            .iter()
            .filter(|m| m.status == OutboxStatus::DeadLetter)
            .cloned()
            .collect();
        dead.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        dead.truncate(limit.max(0) as usize);
        Ok(dead)
    }
}
