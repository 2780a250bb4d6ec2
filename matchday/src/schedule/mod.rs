//! Match generation engine.
//!
//! Pure functions only: given a team list, a topology, and an optional
//! designated opening pair, produce planned matches. Shapes are
//! deterministic; randomness comes solely from the caller's RNG (seed it in
//! tests for reproducible output). Kickoff times use fixed day/hour
//! increments from an anchor, never randomization, so two runs over the same
//! team order collide nowhere and diff cleanly.

pub mod groups;
pub mod knockout;
pub mod manual;
pub mod plan;
pub mod round_robin;

use crate::tournament::TeamId;
use thiserror::Error;

pub use groups::{distribute_into_groups, validate_distribution};
pub use knockout::knockout_round;
pub use manual::{
    GroupAssignment, KnockoutPairing, ManualDraw, plan_from_group_draw, plan_from_knockout_draw,
    validate_group_draw, validate_knockout_draw,
};
pub use plan::{
    GROUP_STAGE, LEAGUE_STAGE, OpeningPair, PlannedMatch, ROUND_SPACING_DAYS, SLOT_SPACING_HOURS,
    knockout_stage_name, slot_time,
};
pub use round_robin::round_robin;

/// Match generation errors. Validation failures are hard errors; nothing is
/// ever silently corrected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("at least {min} teams required, got {got}")]
    TooFewTeams { min: usize, got: usize },

    #[error("group count must be between 1 and the team count ({teams}), got {groups}")]
    InvalidGroupCount { groups: u32, teams: usize },

    #[error("opening pair must name two distinct teams")]
    OpeningPairSameTeam,

    #[error("opening pair team {0} is not among the teams being scheduled")]
    OpeningTeamUnknown(TeamId),

    #[error("group distribution invalid: {0}")]
    InvalidDistribution(String),

    #[error("knockout rounds need an even number of entrants, got {0}")]
    UnevenBracket(usize),

    #[error("draw is empty")]
    EmptyDraw,

    #[error("draw mixes round numbers ({0} and {1})")]
    MixedRounds(u32, u32),

    #[error("team {0} appears more than once in the draw")]
    DuplicateTeamInDraw(TeamId),

    #[error("team {0} plays itself in the draw")]
    TeamPlaysItself(TeamId),

    #[error("draw names team {0}, which is not eligible")]
    IneligibleTeam(TeamId),

    #[error("draw does not cover all eligible teams; missing team {0}")]
    MissingTeam(TeamId),

    #[error("draw must contain exactly {expected} groups, got {got}")]
    GroupCountMismatch { expected: u32, got: u32 },
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
