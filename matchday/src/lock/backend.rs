//! Lock backend contract.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Lock backend errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type LockResult<T> = Result<T, LockError>;

/// Atomic "set key if absent, with expiry" storage.
///
/// Implementations must guarantee that `try_acquire` is a single atomic
/// operation: at most one holder per key at any instant, and a key whose
/// entry has expired is acquirable again. Callers treat an `Err` from either
/// method as "lock not acquired" — never as "lock acquired".
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Attempt to take `key` for `holder`. Returns `false` immediately if the
    /// key is held by someone else and not yet expired.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LockResult<bool>;

    /// Release `key` if (and only if) `holder` currently owns it. Returns
    /// whether an entry was actually removed; releasing a non-held key is a
    /// no-op.
    async fn release(&self, key: &str, holder: &str) -> LockResult<bool>;
}
