//! Outbox message rows and retry arithmetic.

use crate::events::DomainEvent;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub type OutboxMessageId = i64;

/// Retry ceiling before a message dead-letters.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Base delay for exponential backoff (`2^retry_count * base`).
pub const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Message delivery state. Transitions only move forward:
/// `Pending/Failed -> Processing -> {Processed | Failed -> ... -> DeadLetter}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Processed => "processed",
            OutboxStatus::Failed => "failed",
            OutboxStatus::DeadLetter => "dead_letter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "processing" => Some(OutboxStatus::Processing),
            "processed" => Some(OutboxStatus::Processed),
            "failed" => Some(OutboxStatus::Failed),
            "dead_letter" => Some(OutboxStatus::DeadLetter),
            _ => None,
        }
    }

    /// Terminal states are never claimed again.
    pub fn is_terminal(self) -> bool {
        matches!(self, OutboxStatus::Processed | OutboxStatus::DeadLetter)
    }
}

/// A persisted outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub id: OutboxMessageId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub occurred_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A row about to be appended (id assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxMessage {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl NewOutboxMessage {
    /// Serialize a domain event into an appendable row.
    pub fn from_event(
        event: &DomainEvent,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event.type_tag().to_string(),
            payload: event.payload_json()?,
            occurred_at,
        })
    }
}

/// Exponential backoff: `2^retry_count * base`, exponent capped at 10.
pub fn retry_delay(retry_count: i32, base: Duration) -> chrono::Duration {
    let exp = retry_count.clamp(0, 10) as u32;
    let delay = base.saturating_mul(2u32.saturating_pow(exp));
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(i32::MAX as i64))
}

/// The decided fate of one claimed message, persisted in a single store call
/// per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDisposition {
    pub id: OutboxMessageId,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MessageDisposition {
    pub fn processed(message: &OutboxMessage, at: DateTime<Utc>) -> Self {
        Self {
            id: message.id,
            status: OutboxStatus::Processed,
            retry_count: message.retry_count,
            scheduled_at: message.scheduled_at,
            last_error: message.last_error.clone(),
            processed_at: Some(at),
        }
    }

    /// Schedule a retry: the count goes up and `scheduled_at` moves forward.
    pub fn failed(
        message: &OutboxMessage,
        error: String,
        now: DateTime<Utc>,
        base: Duration,
    ) -> Self {
        let retry_count = message.retry_count + 1;
        Self {
            id: message.id,
            status: OutboxStatus::Failed,
            retry_count,
            scheduled_at: now + retry_delay(retry_count, base),
            last_error: Some(error),
            processed_at: None,
        }
    }

    /// Retry budget exhausted; the reason is kept for operator inspection.
    pub fn dead_lettered(message: &OutboxMessage, error: String) -> Self {
        Self {
            id: message.id,
            status: OutboxStatus::DeadLetter,
            retry_count: message.retry_count + 1,
            scheduled_at: message.scheduled_at,
            last_error: Some(error),
            processed_at: None,
        }
    }
}
