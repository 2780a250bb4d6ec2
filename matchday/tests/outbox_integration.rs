//! Integration tests for the outbox processor.
//!
//! These run the real processor against the in-memory store and lock
//! backend, which share the semantics of the Postgres implementations.

use async_trait::async_trait;
use chrono::Utc;
use matchday::events::{DomainEvent, TournamentFinalized};
use matchday::lock::{LockManager, MemoryLockBackend};
use matchday::outbox::{
    EventDispatcher, EventHandler, EventTypeRegistry, MemoryOutboxStore, NewOutboxMessage,
    OutboxProcessor, OutboxProcessorConfig, OutboxStatus, OutboxStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct CountingHandler {
    published: AtomicUsize,
    fail: bool,
}

impl CountingHandler {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            published: AtomicUsize::new(0),
            fail,
        })
    }

    fn count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("handler configured to fail");
        }
        Ok(())
    }
}

fn finalized_event(id: i64) -> NewOutboxMessage {
    let event = DomainEvent::TournamentFinalized(TournamentFinalized {
        tournament_id: id,
        winner_team_id: 42,
    });
    NewOutboxMessage::from_event(&event, Utc::now()).expect("serializable event")
}

fn processor(
    store: Arc<MemoryOutboxStore>,
    handler: Arc<CountingHandler>,
    config: OutboxProcessorConfig,
    lock_backend: Arc<MemoryLockBackend>,
) -> OutboxProcessor {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.subscribe(handler);
    OutboxProcessor::new(
        store,
        Arc::new(EventTypeRegistry::with_known_events()),
        Arc::new(dispatcher),
        Arc::new(LockManager::new(lock_backend)),
        config,
    )
}

fn fast_config() -> OutboxProcessorConfig {
    OutboxProcessorConfig {
        batch_size: 10,
        max_retries: 3,
        // Zero base delay keeps failed messages immediately due again.
        base_retry_delay: Duration::from_secs(0),
        poll_interval: Duration::from_millis(10),
        leader_lock_ttl: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_happy_path_marks_processed() {
    let store = Arc::new(MemoryOutboxStore::new());
    let handler = CountingHandler::new(false);
    store
        .append(vec![finalized_event(1), finalized_event(2)])
        .await
        .unwrap();

    let processor = processor(
        store.clone(),
        handler.clone(),
        fast_config(),
        Arc::new(MemoryLockBackend::new()),
    );
    let outcome = processor.run_cycle().await.unwrap();

    assert!(!outcome.skipped);
    assert_eq!(outcome.claimed, 2);
    assert_eq!(outcome.processed, 2);
    assert_eq!(handler.count(), 2);

    let rows = store.snapshot().await;
    assert!(rows.iter().all(|m| m.status == OutboxStatus::Processed));
    assert!(rows.iter().all(|m| m.processed_at.is_some()));
}

#[tokio::test]
async fn test_failing_message_dead_letters_at_retry_ceiling() {
    let store = Arc::new(MemoryOutboxStore::new());
    let handler = CountingHandler::new(true);
    store.append(vec![finalized_event(1)]).await.unwrap();

    let config = fast_config();
    let max_retries = config.max_retries;
    let processor = processor(
        store.clone(),
        handler.clone(),
        config,
        Arc::new(MemoryLockBackend::new()),
    );

    // Attempts 1 and 2 fail and reschedule; attempt 3 dead-letters.
    for expected_retry in 1..max_retries {
        let outcome = processor.run_cycle().await.unwrap();
        assert_eq!(outcome.retried, 1, "attempt {expected_retry} should retry");
        let row = store.get(1).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.retry_count, expected_retry);
    }

    let outcome = processor.run_cycle().await.unwrap();
    assert_eq!(outcome.dead_lettered, 1);

    let row = store.get(1).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert_eq!(row.retry_count, max_retries);
    assert!(row.last_error.as_deref().is_some_and(|e| !e.is_empty()));
    assert_eq!(store.dead_letters(10).await.unwrap().len(), 1);

    // Dead-lettered messages are never published again.
    let published_before = handler.count();
    for _ in 0..3 {
        let outcome = processor.run_cycle().await.unwrap();
        assert_eq!(outcome.claimed, 0);
    }
    assert_eq!(handler.count(), published_before);
}

#[tokio::test]
async fn test_unresolvable_type_counts_toward_retry_budget() {
    let store = Arc::new(MemoryOutboxStore::new());
    let handler = CountingHandler::new(false);
    store
        .append(vec![NewOutboxMessage {
            event_type: "no.such.event".to_string(),
            payload: serde_json::json!({"tournament_id": 1}),
            occurred_at: Utc::now(),
        }])
        .await
        .unwrap();

    let config = fast_config();
    let max_retries = config.max_retries;
    let processor = processor(
        store.clone(),
        handler.clone(),
        config,
        Arc::new(MemoryLockBackend::new()),
    );

    for _ in 0..max_retries {
        processor.run_cycle().await.unwrap();
    }

    let row = store.get(1).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert!(
        row.last_error
            .as_deref()
            .is_some_and(|e| e.contains("no.such.event"))
    );
    // The dispatcher never saw it.
    assert_eq!(handler.count(), 0);
}

#[tokio::test]
async fn test_leader_lock_skips_cycle_when_held() {
    let store = Arc::new(MemoryOutboxStore::new());
    let handler = CountingHandler::new(false);
    store.append(vec![finalized_event(1)]).await.unwrap();

    let lock_backend = Arc::new(MemoryLockBackend::new());
    let external = LockManager::new(lock_backend.clone());
    let guard = external
        .acquire("outbox_processor_lock", Duration::from_secs(10))
        .await
        .expect("free lock");

    let processor = processor(store.clone(), handler.clone(), fast_config(), lock_backend);
    let outcome = processor.run_cycle().await.unwrap();
    assert!(outcome.skipped);
    assert_eq!(handler.count(), 0);

    guard.release().await;
    let outcome = processor.run_cycle().await.unwrap();
    assert_eq!(outcome.processed, 1);
}

#[tokio::test]
async fn test_racing_processors_publish_each_message_exactly_once() {
    let store = Arc::new(MemoryOutboxStore::new());
    let handler = CountingHandler::new(false);
    let lock_backend = Arc::new(MemoryLockBackend::new());

    let mut batch = Vec::new();
    for id in 1..=5 {
        batch.push(finalized_event(id));
    }
    store.append(batch).await.unwrap();

    // Two independent processor instances (distinct holder identities)
    // hammer the same store concurrently.
    let a = Arc::new(processor(
        store.clone(),
        handler.clone(),
        fast_config(),
        lock_backend.clone(),
    ));
    let b = Arc::new(processor(
        store.clone(),
        handler.clone(),
        fast_config(),
        lock_backend,
    ));

    let mut tasks = Vec::new();
    for instance in [a, b] {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..200 {
                instance.run_cycle().await.unwrap();
                let done = store
                    .snapshot()
                    .await
                    .iter()
                    .all(|m| m.status == OutboxStatus::Processed);
                if done {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let rows = store.snapshot().await;
    assert_eq!(rows.len(), 5);
    assert!(
        rows.iter().all(|m| m.status == OutboxStatus::Processed),
        "every message reaches Processed exactly once"
    );
    // Total publish-call count equals the message count: no double publish.
    assert_eq!(handler.count(), 5);
}
