//! Distributed mutual exclusion keyed by string, with TTL.
//!
//! This module serializes competing writers (two admins closing registration
//! at once, a match-end trigger racing the periodic sweep) and elects the
//! outbox processor leader. Acquisition never blocks: a busy key returns
//! immediately so callers can fail fast instead of queueing, and a backend
//! error is treated as "not acquired" — the lock fails closed.
//!
//! Which backend a deployment uses is a startup-time wiring choice, not a
//! per-call failover. [`PgLockBackend`] is the embedded path against the
//! primary datastore; [`MemoryLockBackend`] serves single-node runs and tests.

pub mod backend;
pub mod manager;
pub mod memory;
pub mod postgres;

pub use backend::{LockBackend, LockError, LockResult};
pub use manager::{
    DEFAULT_LOCK_TTL, LockGuard, LockManager, OUTBOX_PROCESSOR_LOCK, tournament_lock_key,
};
pub use memory::MemoryLockBackend;
pub use postgres::PgLockBackend;
