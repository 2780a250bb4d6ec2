//! Structured results of lifecycle operations.

use super::models::{TeamId, TournamentId, TournamentStatus};
use serde::Serialize;

/// What a lifecycle operation decided, returned to the caller instead of
/// performing side effects. Notification and analytics code reacts to these
/// flags; the lifecycle service knows nothing about those channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleOutcome {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub tournament_finalized: bool,
    pub next_round_generated: bool,
    pub groups_finished: bool,
    pub manual_draw_required: bool,
    pub manual_qualification_required: bool,
    pub winner_team_id: Option<TeamId>,
    pub generated_round: Option<u32>,
    pub generated_match_count: usize,
}

impl LifecycleOutcome {
    /// An outcome with nothing decided yet.
    pub fn idle(tournament_id: TournamentId, status: TournamentStatus) -> Self {
        Self {
            tournament_id,
            status,
            tournament_finalized: false,
            next_round_generated: false,
            groups_finished: false,
            manual_draw_required: false,
            manual_qualification_required: false,
            winner_team_id: None,
            generated_round: None,
            generated_match_count: 0,
        }
    }

    /// True when the operation changed or decided anything worth reacting to.
    pub fn is_actionable(&self) -> bool {
        self.tournament_finalized
            || self.next_round_generated
            || self.groups_finished
            || self.manual_draw_required
            || self.manual_qualification_required
    }
}
