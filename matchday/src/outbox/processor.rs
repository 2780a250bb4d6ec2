//! Outbox processor: the background loop that drains the outbox.
//!
//! Exactly one instance acts per cycle, enforced by the
//! [`OUTBOX_PROCESSOR_LOCK`] leader lock with a TTL longer than the poll
//! interval. A cycle that fails is logged and the loop carries on; nothing
//! here ever takes the loop down.

use super::dispatcher::EventDispatcher;
use super::models::{MessageDisposition, OutboxMessage};
use super::registry::EventTypeRegistry;
use super::store::{OutboxResult, OutboxStore};
use crate::lock::{LockManager, OUTBOX_PROCESSOR_LOCK};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outbox processor tuning knobs.
#[derive(Debug, Clone)]
pub struct OutboxProcessorConfig {
    /// Rows claimed per cycle.
    pub batch_size: i64,

    /// Failures before a message dead-letters.
    pub max_retries: i32,

    /// Base delay for exponential backoff.
    pub base_retry_delay: Duration,

    /// Pause between cycles.
    pub poll_interval: Duration,

    /// Leader lock TTL. Must exceed `poll_interval` so a live leader is never
    /// pre-empted mid-cycle.
    pub leader_lock_ttl: Duration,
}

impl Default for OutboxProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: super::models::DEFAULT_MAX_RETRIES,
            base_retry_delay: super::models::DEFAULT_BASE_RETRY_DELAY,
            poll_interval: Duration::from_secs(5),
            leader_lock_ttl: Duration::from_secs(30),
        }
    }
}

impl OutboxProcessorConfig {
    /// Configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            max_retries: std::env::var("OUTBOX_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_retry_delay: std::env::var("OUTBOX_BASE_RETRY_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.base_retry_delay),
            poll_interval: std::env::var("OUTBOX_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            leader_lock_ttl: std::env::var("OUTBOX_LEADER_LOCK_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.leader_lock_ttl),
        }
    }
}

/// What one cycle did, for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// The leader lock was held elsewhere; the cycle did nothing.
    pub skipped: bool,
    pub claimed: usize,
    pub processed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl CycleOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Claims due outbox messages and publishes them to in-process subscribers.
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    registry: Arc<EventTypeRegistry>,
    dispatcher: Arc<EventDispatcher>,
    locks: Arc<LockManager>,
    config: OutboxProcessorConfig,
}

impl OutboxProcessor {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        registry: Arc<EventTypeRegistry>,
        dispatcher: Arc<EventDispatcher>,
        locks: Arc<LockManager>,
        config: OutboxProcessorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
            locks,
            config,
        }
    }

    /// Run until the shutdown signal flips.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("outbox processor started");
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("outbox processor received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) if outcome.skipped => {
                            debug!("outbox cycle skipped; leader lock held elsewhere");
                        }
                        Ok(outcome) if outcome.claimed > 0 => {
                            info!(
                                "outbox cycle: {} claimed, {} processed, {} retried, {} dead-lettered",
                                outcome.claimed,
                                outcome.processed,
                                outcome.retried,
                                outcome.dead_lettered
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("outbox cycle failed: {e}"),
                    }
                }
            }
        }

        info!("outbox processor shutdown complete");
    }

    /// One full leader-locked cycle. Public so tests (and a manual admin
    /// trigger) can drive the processor without the timer.
    pub async fn run_cycle(&self) -> OutboxResult<CycleOutcome> {
        let Some(guard) = self
            .locks
            .acquire(OUTBOX_PROCESSOR_LOCK, self.config.leader_lock_ttl)
            .await
        else {
            return Ok(CycleOutcome::skipped());
        };

        let result = self.process_batch().await;
        guard.release().await;
        result
    }

    async fn process_batch(&self) -> OutboxResult<CycleOutcome> {
        let now = Utc::now();
        let batch = self
            .store
            .claim_due(self.config.batch_size, self.config.max_retries, now)
            .await?;

        if batch.is_empty() {
            return Ok(CycleOutcome::default());
        }

        let mut outcome = CycleOutcome {
            claimed: batch.len(),
            ..CycleOutcome::default()
        };
        let mut dispositions = Vec::with_capacity(batch.len());

        for message in &batch {
            match self.publish(message).await {
                Ok(()) => {
                    outcome.processed += 1;
                    dispositions.push(MessageDisposition::processed(message, Utc::now()));
                }
                Err(reason) => {
                    let attempts = message.retry_count + 1;
                    if attempts >= self.config.max_retries {
                        warn!(
                            "outbox message {} ({}) dead-lettered after {} attempts: {reason}",
                            message.id, message.event_type, attempts
                        );
                        outcome.dead_lettered += 1;
                        dispositions.push(MessageDisposition::dead_lettered(message, reason));
                    } else {
                        debug!(
                            "outbox message {} ({}) failed (attempt {}): {reason}",
                            message.id, message.event_type, attempts
                        );
                        outcome.retried += 1;
                        dispositions.push(MessageDisposition::failed(
                            message,
                            reason,
                            now,
                            self.config.base_retry_delay,
                        ));
                    }
                }
            }
        }

        self.store.persist_outcomes(&dispositions).await?;
        Ok(outcome)
    }

    /// Resolve and dispatch one message. An unresolvable type is a permanent
    /// failure but takes the same retry path as a transient one, so it
    /// dead-letters instead of retrying forever.
    async fn publish(&self, message: &OutboxMessage) -> Result<(), String> {
        let event = self
            .registry
            .decode(&message.event_type, message.payload.clone())
            .map_err(|e| e.to_string())?;
        self.dispatcher
            .dispatch(&event)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_overrides_defaults() {
        unsafe {
            std::env::set_var("OUTBOX_BATCH_SIZE", "7");
            std::env::set_var("OUTBOX_MAX_RETRIES", "2");
            std::env::set_var("OUTBOX_POLL_INTERVAL_SECS", "1");
        }
        let config = OutboxProcessorConfig::from_env();
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        // Untouched knobs keep their defaults.
        assert_eq!(
            config.leader_lock_ttl,
            OutboxProcessorConfig::default().leader_lock_ttl
        );
        unsafe {
            std::env::remove_var("OUTBOX_BATCH_SIZE");
            std::env::remove_var("OUTBOX_MAX_RETRIES");
            std::env::remove_var("OUTBOX_POLL_INTERVAL_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_config_ignores_malformed_env() {
        unsafe {
            std::env::set_var("OUTBOX_BATCH_SIZE", "not-a-number");
        }
        let config = OutboxProcessorConfig::from_env();
        assert_eq!(config.batch_size, OutboxProcessorConfig::default().batch_size);
        unsafe {
            std::env::remove_var("OUTBOX_BATCH_SIZE");
        }
    }
}
