//! Tournament storage contract.

use super::models::{
    Match, MatchId, RegistrationStatus, SchedulingMode, TeamId, TeamRegistration, Tournament,
    TournamentId, TournamentMode,
};
use crate::schedule::PlannedMatch;
use async_trait::async_trait;
use thiserror::Error;

/// Tournament storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("team {team_id} is already registered for tournament {tournament_id}")]
    DuplicateRegistration {
        tournament_id: TournamentId,
        team_id: TeamId,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Parameters for creating a tournament in `Draft`.
#[derive(Debug, Clone)]
pub struct NewTournament {
    pub name: String,
    pub mode: TournamentMode,
    pub scheduling_mode: SchedulingMode,
    pub number_of_groups: u32,
    pub min_teams: u32,
    pub max_teams: u32,
    pub require_opening_selection: bool,
}

/// Field updates for one registration row. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RegistrationUpdate {
    pub team_id: TeamId,
    pub status: Option<RegistrationStatus>,
    pub group_index: Option<u32>,
    pub qualified_for_knockout: Option<bool>,
}

/// A result being recorded on one match row.
#[derive(Debug, Clone, Copy)]
pub struct CompletedMatch {
    pub match_id: MatchId,
    pub home_score: i32,
    pub away_score: i32,
}

/// Everything one lifecycle operation wants persisted besides the tournament
/// row itself. Applied atomically with the entity write and the event drain.
#[derive(Debug, Default)]
pub struct SaveChanges {
    pub new_registrations: Vec<TeamId>,
    pub registration_updates: Vec<RegistrationUpdate>,
    pub new_matches: Vec<PlannedMatch>,
    /// Cancel still-`Scheduled` knockout matches of this round (manual draw
    /// replacing an auto-generated round).
    pub cancel_scheduled_in_round: Option<u32>,
    pub completed_match: Option<CompletedMatch>,
}

impl SaveChanges {
    pub fn is_empty(&self) -> bool {
        self.new_registrations.is_empty()
            && self.registration_updates.is_empty()
            && self.new_matches.is_empty()
            && self.cancel_scheduled_in_round.is_none()
            && self.completed_match.is_none()
    }
}

/// Storage seam for the lifecycle service.
///
/// `save` is the single atomic unit: tournament row, registration inserts
/// and updates, match inserts/cancellations, the recorded result, and the
/// drained domain events all land together or not at all. The aggregate's
/// pending events are cleared only after a successful commit.
#[async_trait]
pub trait TournamentStore: Send + Sync {
    async fn create(&self, new: NewTournament) -> StoreResult<Tournament>;

    async fn get(&self, id: TournamentId) -> StoreResult<Option<Tournament>>;

    async fn registrations(&self, id: TournamentId) -> StoreResult<Vec<TeamRegistration>>;

    async fn matches(&self, id: TournamentId) -> StoreResult<Vec<Match>>;

    async fn get_match(&self, match_id: MatchId) -> StoreResult<Option<Match>>;

    /// Tournaments the periodic sweep should look at.
    async fn active_tournament_ids(&self) -> StoreResult<Vec<TournamentId>>;

    async fn save(&self, tournament: &mut Tournament, changes: SaveChanges) -> StoreResult<()>;
}
