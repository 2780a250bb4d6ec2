//! Transactional outbox: durable at-least-once event delivery.
//!
//! Events recorded by an aggregate are written to the `outbox_messages` table
//! in the same atomic unit as the entity change (see the tournament store's
//! save pipeline), then published asynchronously by [`OutboxProcessor`] — a
//! leader-locked background loop that claims due messages, resolves their
//! payload type through [`EventTypeRegistry`], dispatches them to in-process
//! subscribers, and tracks retry/backoff/dead-letter state.
//!
//! Ordering is per batch (`occurred_at` order); consumers must be
//! idempotent and order-tolerant across batches.

pub mod dispatcher;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod processor;
pub mod registry;
pub mod store;

pub use dispatcher::{DispatchError, EventDispatcher, EventHandler};
pub use memory::MemoryOutboxStore;
pub use models::{
    DEFAULT_BASE_RETRY_DELAY, DEFAULT_MAX_RETRIES, MessageDisposition, NewOutboxMessage,
    OutboxMessage, OutboxMessageId, OutboxStatus, retry_delay,
};
pub use postgres::PgOutboxStore;
pub use processor::{CycleOutcome, OutboxProcessor, OutboxProcessorConfig};
pub use registry::{EventTypeRegistry, RegistryError};
pub use store::{OutboxError, OutboxResult, OutboxStore};
