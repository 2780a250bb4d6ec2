//! Tournament data models.

use crate::events::{DomainEvent, TournamentStatusChanged};
use crate::schedule::{LEAGUE_STAGE, OpeningPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tournament ID type
pub type TournamentId = i64;
/// Team ID type
pub type TeamId = i64;
/// Match ID type
pub type MatchId = i64;
/// Registration row ID type
pub type RegistrationId = i64;

/// Tournament lifecycle status. Transitions only move along the edges
/// encoded in [`TournamentStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentStatus {
    /// Being configured; not visible to teams yet
    Draft,
    /// Accepting registrations
    RegistrationOpen,
    /// Registration closed; awaiting schedule generation or a manual draw
    RegistrationClosed,
    /// Awaiting the organiser's opening-match pick before play can start
    WaitingForOpeningMatchSelection,
    /// Matches scheduled and being played
    Active,
    /// Group stage done; the organiser must pick who advances
    ManualQualificationPending,
    /// Knockout participants settled
    QualificationConfirmed,
    /// Finished with a winner
    Completed,
    /// Abandoned before completion
    Cancelled,
}

impl TournamentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TournamentStatus::Draft => "draft",
            TournamentStatus::RegistrationOpen => "registration_open",
            TournamentStatus::RegistrationClosed => "registration_closed",
            TournamentStatus::WaitingForOpeningMatchSelection => "waiting_for_opening_selection",
            TournamentStatus::Active => "active",
            TournamentStatus::ManualQualificationPending => "manual_qualification_pending",
            TournamentStatus::QualificationConfirmed => "qualification_confirmed",
            TournamentStatus::Completed => "completed",
            TournamentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TournamentStatus::Draft),
            "registration_open" => Some(TournamentStatus::RegistrationOpen),
            "registration_closed" => Some(TournamentStatus::RegistrationClosed),
            "waiting_for_opening_selection" => {
                Some(TournamentStatus::WaitingForOpeningMatchSelection)
            }
            "active" => Some(TournamentStatus::Active),
            "manual_qualification_pending" => Some(TournamentStatus::ManualQualificationPending),
            "qualification_confirmed" => Some(TournamentStatus::QualificationConfirmed),
            "completed" => Some(TournamentStatus::Completed),
            "cancelled" => Some(TournamentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TournamentStatus::Completed | TournamentStatus::Cancelled)
    }

    /// Allowed edge table of the lifecycle state machine.
    pub fn can_transition_to(self, next: TournamentStatus) -> bool {
        use TournamentStatus::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Draft, RegistrationOpen)
                | (RegistrationOpen, RegistrationClosed)
                | (RegistrationClosed, Active)
                | (RegistrationClosed, WaitingForOpeningMatchSelection)
                | (WaitingForOpeningMatchSelection, Active)
                | (Active, ManualQualificationPending)
                | (Active, QualificationConfirmed)
                | (Active, Completed)
                | (ManualQualificationPending, QualificationConfirmed)
                | (QualificationConfirmed, Active)
        )
    }
}

/// Attempted edge not present in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TournamentStatus,
    pub to: TournamentStatus,
}

/// Bracket topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentMode {
    /// Single round robin, all teams in one table
    League,
    /// Home/away double round robin
    LeagueDouble,
    /// Single-elimination, one leg per tie
    Knockout,
    /// Single-elimination, home/away legs per tie
    KnockoutTwoLegged,
    /// Group stage feeding a single-leg knockout bracket
    GroupsThenKnockout,
}

impl TournamentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TournamentMode::League => "league",
            TournamentMode::LeagueDouble => "league_double",
            TournamentMode::Knockout => "knockout",
            TournamentMode::KnockoutTwoLegged => "knockout_two_legged",
            TournamentMode::GroupsThenKnockout => "groups_then_knockout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "league" => Some(TournamentMode::League),
            "league_double" => Some(TournamentMode::LeagueDouble),
            "knockout" => Some(TournamentMode::Knockout),
            "knockout_two_legged" => Some(TournamentMode::KnockoutTwoLegged),
            "groups_then_knockout" => Some(TournamentMode::GroupsThenKnockout),
            _ => None,
        }
    }

    pub fn has_group_stage(self) -> bool {
        matches!(self, TournamentMode::GroupsThenKnockout)
    }

    pub fn is_league(self) -> bool {
        matches!(self, TournamentMode::League | TournamentMode::LeagueDouble)
    }

    pub fn double_round(self) -> bool {
        matches!(self, TournamentMode::LeagueDouble)
    }

    pub fn two_legged_knockout(self) -> bool {
        matches!(self, TournamentMode::KnockoutTwoLegged)
    }
}

/// Who decides the draw: the engine or the organiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingMode {
    Automatic,
    Manual,
}

impl SchedulingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulingMode::Automatic => "automatic",
            SchedulingMode::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(SchedulingMode::Automatic),
            "manual" => Some(SchedulingMode::Manual),
            _ => None,
        }
    }
}

/// A tournament aggregate. Domain events accumulate on the entity while an
/// operation runs; the store drains them into the outbox in the same atomic
/// unit as the entity writes and clears them after a successful commit.
#[derive(Debug, Clone)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub mode: TournamentMode,
    pub scheduling_mode: SchedulingMode,
    pub number_of_groups: u32,
    pub min_teams: u32,
    pub max_teams: u32,
    pub opening_team_a: Option<TeamId>,
    pub opening_team_b: Option<TeamId>,
    pub require_opening_selection: bool,
    pub winner_team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pending_events: Vec<DomainEvent>,
}

impl Tournament {
    /// Rehydrate from storage with no pending events.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TournamentId,
        name: String,
        status: TournamentStatus,
        mode: TournamentMode,
        scheduling_mode: SchedulingMode,
        number_of_groups: u32,
        min_teams: u32,
        max_teams: u32,
        opening_team_a: Option<TeamId>,
        opening_team_b: Option<TeamId>,
        require_opening_selection: bool,
        winner_team_id: Option<TeamId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            status,
            mode,
            scheduling_mode,
            number_of_groups,
            min_teams,
            max_teams,
            opening_team_a,
            opening_team_b,
            require_opening_selection,
            winner_team_id,
            created_at,
            updated_at,
            pending_events: Vec::new(),
        }
    }

    /// Move along an allowed edge, recording a status-changed event.
    pub fn transition_to(&mut self, next: TournamentStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        self.record_event(DomainEvent::TournamentStatusChanged(TournamentStatusChanged {
            tournament_id: self.id,
            previous,
            next,
        }));
        Ok(())
    }

    /// Record a domain event for the outbox drain at save time.
    pub fn record_event(&mut self, event: DomainEvent) {
        self.pending_events.push(event);
    }

    /// Drain the pending events. Called by stores after a successful commit
    /// so a later unrelated save cannot re-emit them.
    pub fn take_pending_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending_events
    }

    pub fn opening_pair(&self) -> Option<OpeningPair> {
        match (self.opening_team_a, self.opening_team_b) {
            (Some(team_a), Some(team_b)) => Some(OpeningPair { team_a, team_b }),
            _ => None,
        }
    }

    /// Set the winner. Only meaningful once, from the completing transition;
    /// a second attempt is ignored.
    pub fn set_winner(&mut self, team_id: TeamId) {
        if self.winner_team_id.is_none() {
            self.winner_team_id = Some(team_id);
        }
    }
}

/// Team registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Pending,
    PendingPaymentReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::PendingPaymentReview => "pending_payment_review",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RegistrationStatus::Pending),
            "pending_payment_review" => Some(RegistrationStatus::PendingPaymentReview),
            "approved" => Some(RegistrationStatus::Approved),
            "rejected" => Some(RegistrationStatus::Rejected),
            "withdrawn" => Some(RegistrationStatus::Withdrawn),
            _ => None,
        }
    }

    /// Still holds (or may hold) a slot in the tournament.
    pub fn occupies_slot(self) -> bool {
        matches!(
            self,
            RegistrationStatus::Pending
                | RegistrationStatus::PendingPaymentReview
                | RegistrationStatus::Approved
        )
    }
}

/// A team's registration in one tournament. `(tournament_id, team_id)` is
/// unique. `group_index` is assigned only for group-stage modes while the
/// registration is approved; `qualified_for_knockout` is set exactly once,
/// when qualification settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRegistration {
    pub id: RegistrationId,
    pub tournament_id: TournamentId,
    pub team_id: TeamId,
    pub status: RegistrationStatus,
    pub group_index: Option<u32>,
    pub qualified_for_knockout: Option<bool>,
    pub registered_at: DateTime<Utc>,
}

/// Match progress status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(MatchStatus::Scheduled),
            "in_progress" => Some(MatchStatus::InProgress),
            "completed" => Some(MatchStatus::Completed),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

/// One fixture. Scores are present only once recorded; a team never plays
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub group_index: Option<u32>,
    pub round_number: u32,
    pub stage: String,
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub kickoff_at: DateTime<Utc>,
    pub is_opening_match: bool,
}

impl Match {
    /// Winner of a completed match; `None` for draws or unfinished matches.
    pub fn winner(&self) -> Option<TeamId> {
        if self.status != MatchStatus::Completed {
            return None;
        }
        match (self.home_score, self.away_score) {
            (Some(home), Some(away)) if home > away => Some(self.home_team_id),
            (Some(home), Some(away)) if away > home => Some(self.away_team_id),
            _ => None,
        }
    }

    pub fn is_group_stage(&self) -> bool {
        self.group_index.is_some()
    }

    /// Part of an elimination bracket (not group, not league).
    pub fn is_knockout(&self) -> bool {
        self.group_index.is_none() && self.stage != LEAGUE_STAGE
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team_id == team || self.away_team_id == team
    }
}
