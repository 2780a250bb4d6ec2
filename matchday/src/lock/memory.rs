//! In-process lock backend for single-node deployments and tests.

use super::backend::{LockBackend, LockResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct LockEntry {
    holder: String,
    expires_at: Instant,
}

/// Lock table held in process memory.
///
/// Provides the same at-most-one-holder and auto-expiry semantics as the
/// database-backed implementation, minus cross-process visibility.
#[derive(Default)]
pub struct MemoryLockBackend {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> LockResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(false),
            _ => {
                entries.insert(
                    key.to_string(),
                    LockEntry {
                        holder: holder.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, holder: &str) -> LockResult<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.holder == holder => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_free_key_always_acquirable() {
        let backend = MemoryLockBackend::new();
        assert!(
            backend
                .try_acquire("t:1", "a", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_held_key_rejects_other_holder() {
        let backend = MemoryLockBackend::new();
        assert!(
            backend
                .try_acquire("t:1", "a", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            !backend
                .try_acquire("t:1", "b", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_expired_key_acquirable_again() {
        let backend = MemoryLockBackend::new();
        assert!(
            backend
                .try_acquire("t:1", "a", Duration::from_millis(0))
                .await
                .unwrap()
        );
        assert!(
            backend
                .try_acquire("t:1", "b", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_release_is_holder_scoped() {
        let backend = MemoryLockBackend::new();
        backend
            .try_acquire("t:1", "a", Duration::from_secs(10))
            .await
            .unwrap();

        // Someone else's release is a no-op.
        assert!(!backend.release("t:1", "b").await.unwrap());
        assert!(
            !backend
                .try_acquire("t:1", "b", Duration::from_secs(10))
                .await
                .unwrap()
        );

        // The owner's release frees the key.
        assert!(backend.release("t:1", "a").await.unwrap());
        assert!(
            backend
                .try_acquire("t:1", "b", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_release_unknown_key_is_noop() {
        let backend = MemoryLockBackend::new();
        assert!(!backend.release("missing", "a").await.unwrap());
    }
}
