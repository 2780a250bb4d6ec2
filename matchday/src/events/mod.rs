//! Domain events emitted by tournament aggregates.
//!
//! Events are recorded in-memory on the aggregate while an operation runs and
//! are drained into the transactional outbox by the store's save pipeline, in
//! the same atomic unit as the entity writes. Nothing in this module performs
//! I/O; publication happens later in the outbox processor.

pub mod types;

pub use types::{
    DomainEvent, EventDecodeFn, ManualDrawRequired, ManualQualificationRequired, MatchCompleted,
    MatchesGenerated, QualificationConfirmed, TeamRegistered, TeamWithdrawn, TournamentCancelled,
    TournamentFinalized, TournamentStatusChanged,
};
