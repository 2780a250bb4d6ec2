//! Tournament lifecycle: entities, state machine, storage, and orchestration.
//!
//! The [`TournamentLifecycle`] service owns every status transition. Each
//! operation takes the per-tournament lock for its full duration, mutates the
//! aggregate (recording domain events in memory), and persists everything —
//! entity rows, match rows, registration updates, and the drained events —
//! in one atomic store call. Decision points (`check_and_finalize`,
//! knockout round generation) are driven after every match result and by the
//! periodic [`LifecycleSweeper`].

pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod outcome;
pub mod postgres;
pub mod standings;
pub mod store;
pub mod sweeper;

pub use lifecycle::{LifecycleError, LifecycleResult, TournamentLifecycle};
pub use memory::MemoryTournamentStore;
pub use models::{
    Match, MatchId, MatchStatus, RegistrationId, RegistrationStatus, SchedulingMode,
    TeamId, TeamRegistration, Tournament, TournamentId, TournamentMode, TournamentStatus,
};
pub use outcome::LifecycleOutcome;
pub use postgres::PgTournamentStore;
pub use standings::{TeamStanding, group_standings, standings};
pub use store::{
    CompletedMatch, NewTournament, RegistrationUpdate, SaveChanges, StoreError, StoreResult,
    TournamentStore,
};
pub use sweeper::LifecycleSweeper;
