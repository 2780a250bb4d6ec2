//! Idempotent request gateway.
//!
//! A request-level replay cache keyed by a client-supplied idempotency key
//! plus a content hash of the request body. Retried writes replay the stored
//! response instead of re-executing side effects; a reused key with a
//! different body is rejected outright.

pub mod gateway;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use gateway::{IdempotencyDecision, IdempotencyGateway};
pub use memory::MemoryIdempotencyStore;
pub use models::{IdempotencyStatus, IdempotentRequest, request_hash};
pub use postgres::PgIdempotencyStore;
pub use store::{IdempotencyError, IdempotencyResult, IdempotencyStore, InsertOutcome};
