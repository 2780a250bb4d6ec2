//! In-process publish target for decoded events.
//!
//! Handlers (notification senders, analytics feeds) are collaborators outside
//! this core; they register here at startup. A handler failure fails the
//! whole message so the outbox retries it — handlers are expected to be
//! idempotent, since delivery is at-least-once.

use crate::events::DomainEvent;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use thiserror::Error;

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler `{handler}` failed: {source}")]
    HandlerFailed {
        handler: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A subscriber to published domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Fans one event out to every registered handler, in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `event` to every handler. The first failure aborts the
    /// dispatch and is reported; the message will be retried as a whole.
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<(), DispatchError> {
        for handler in &self.handlers {
            debug!("dispatching {} to {}", event.type_tag(), handler.name());
            handler
                .handle(event)
                .await
                .map_err(|source| DispatchError::HandlerFailed {
                    handler: handler.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
