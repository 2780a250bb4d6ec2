//! Lock manager and RAII guard.

use super::backend::LockBackend;
use crate::tournament::TournamentId;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Leader-election key for the outbox processor loop.
pub const OUTBOX_PROCESSOR_LOCK: &str = "outbox_processor_lock";

/// Default TTL for lifecycle operations. Long enough to cover a slow
/// generation + persistence pass, short enough that a crashed holder does not
/// freeze a tournament for long.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Lock key scoping a single tournament's lifecycle transitions.
pub fn tournament_lock_key(tournament_id: TournamentId) -> String {
    format!("tournament:{tournament_id}")
}

/// Hands out [`LockGuard`]s against a backend, under a stable holder identity.
///
/// A failed acquisition (key busy) and a backend error both yield `None`; the
/// second case is logged. Callers fail fast — there is no queueing or retry
/// here.
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    holder_id: String,
}

impl LockManager {
    /// Create a manager with a fresh holder identity (one per process).
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            holder_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Try to take `key`. Returns `None` immediately when the key is busy or
    /// the backend is unreachable (fail closed).
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Option<LockGuard> {
        match self.backend.try_acquire(key, &self.holder_id, ttl).await {
            Ok(true) => Some(LockGuard {
                backend: self.backend.clone(),
                key: key.to_string(),
                holder: self.holder_id.clone(),
                released: false,
            }),
            Ok(false) => {
                debug!("lock busy: {key}");
                None
            }
            Err(e) => {
                error!("lock store unreachable for {key}, failing closed: {e}");
                None
            }
        }
    }

    /// Take the per-tournament lifecycle lock with the default TTL.
    pub async fn acquire_tournament(&self, tournament_id: TournamentId) -> Option<LockGuard> {
        self.acquire(&tournament_lock_key(tournament_id), DEFAULT_LOCK_TTL)
            .await
    }
}

/// A held lock. Release explicitly with [`LockGuard::release`]; if the guard
/// is dropped instead (panic, cancelled future), a best-effort release task is
/// spawned so cancellation still cleans up, with the TTL as the backstop.
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    holder: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock. Idempotent at the backend: releasing a key that
    /// already expired (or was stolen after expiry) is logged, not an error.
    pub async fn release(mut self) {
        self.released = true;
        match self.backend.release(&self.key, &self.holder).await {
            Ok(true) => {}
            Ok(false) => debug!("released lock {} that was no longer held", self.key),
            Err(e) => warn!("failed to release lock {}: {e}", self.key),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = self.backend.clone();
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = backend.release(&key, &holder).await {
                    warn!("failed to release dropped lock {key}: {e}");
                }
            });
        } else {
            warn!("lock {key} dropped outside a runtime; relying on TTL expiry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::memory::MemoryLockBackend;

    #[tokio::test]
    async fn test_acquire_and_explicit_release() {
        let backend = Arc::new(MemoryLockBackend::new());
        let a = LockManager::new(backend.clone());
        let b = LockManager::new(backend);

        let guard = a.acquire("k", Duration::from_secs(10)).await.unwrap();
        assert!(b.acquire("k", Duration::from_secs(10)).await.is_none());

        guard.release().await;
        assert!(b.acquire("k", Duration::from_secs(10)).await.is_some());
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let backend = Arc::new(MemoryLockBackend::new());
        let a = LockManager::new(backend.clone());
        let b = LockManager::new(backend);

        drop(a.acquire("k", Duration::from_secs(10)).await.unwrap());

        // The drop path spawns a release task; yield until it lands.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(b.acquire("k", Duration::from_secs(10)).await.is_some());
    }

    #[tokio::test]
    async fn test_tournament_key_scoping() {
        assert_eq!(tournament_lock_key(42), "tournament:42");

        let backend = Arc::new(MemoryLockBackend::new());
        let manager = LockManager::new(backend);
        let g1 = manager.acquire_tournament(1).await.unwrap();
        // A different tournament proceeds in parallel.
        let g2 = manager.acquire_tournament(2).await.unwrap();
        g1.release().await;
        g2.release().await;
    }
}
