//! # Matchday
//!
//! The reliability and orchestration core of a multi-team sports tournament
//! platform: the pieces that make tournament state transitions safe under
//! concurrency and crash-recovery.
//!
//! ## Core Modules
//!
//! - [`lock`]: distributed mutual exclusion (string key + TTL, fail-closed)
//!   used to serialize competing writers and elect the outbox leader
//! - [`outbox`]: transactional outbox — events recorded atomically with
//!   entity changes, published asynchronously with retry/backoff and a
//!   dead-letter terminal state
//! - [`events`]: domain event definitions and their stable type tags
//! - [`idempotency`]: request-level replay cache keyed by client idempotency
//!   key + content hash
//! - [`schedule`]: pure match generation — group distribution, round robin,
//!   knockout brackets, manual draw validation
//! - [`tournament`]: the lifecycle state machine that decides, from match and
//!   registration state, whether a tournament advances, plus its storage
//!   seams and the periodic sweeper
//!
//! Storage is trait-based throughout: each concern ships a Postgres
//! implementation and an in-memory one with identical semantics, so a single
//! node (or a test) can run the full core without infrastructure.
//!
//! ## Example
//!
//! ```
//! use matchday::schedule::{OpeningPair, round_robin};
//!
//! let teams = vec![1, 2, 3, 4];
//! let pair = OpeningPair { team_a: 2, team_b: 4 };
//! let anchor = "2026-03-01T15:00:00Z".parse().unwrap();
//! let matches = round_robin(&teams, false, Some(&pair), anchor, None, "League").unwrap();
//!
//! assert_eq!(matches.len(), 6);
//! assert_eq!(matches.iter().filter(|m| m.is_opening_match).count(), 1);
//! ```

pub mod events;
pub mod idempotency;
pub mod lock;
pub mod outbox;
pub mod schedule;
pub mod tournament;

pub use events::DomainEvent;
pub use lock::{LockBackend, LockManager, MemoryLockBackend, PgLockBackend};
pub use outbox::{
    EventDispatcher, EventHandler, EventTypeRegistry, MemoryOutboxStore, OutboxProcessor,
    OutboxProcessorConfig, OutboxStore, PgOutboxStore,
};
pub use tournament::{
    LifecycleOutcome, LifecycleSweeper, MemoryTournamentStore, PgTournamentStore,
    TournamentLifecycle, TournamentStore,
};
