//! Event type definitions and their stable string tags.
//!
//! Every event carries identifiers rather than full entity snapshots;
//! subscribers fetch current state themselves. The string tag is what gets
//! persisted in the outbox `event_type` column, so tags are part of the
//! storage contract and must never be renamed casually.

use crate::tournament::{MatchId, TeamId, TournamentId, TournamentStatus};
use serde::{Deserialize, Serialize};

/// Decoder signature used by the event type registry.
pub type EventDecodeFn = fn(serde_json::Value) -> Result<DomainEvent, serde_json::Error>;

/// Tournament status moved along an allowed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentStatusChanged {
    pub tournament_id: TournamentId,
    pub previous: TournamentStatus,
    pub next: TournamentStatus,
}

/// A team registered for a tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRegistered {
    pub tournament_id: TournamentId,
    pub team_id: TeamId,
}

/// A team withdrew before registration closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamWithdrawn {
    pub tournament_id: TournamentId,
    pub team_id: TeamId,
}

/// A batch of matches was created for a stage/round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchesGenerated {
    pub tournament_id: TournamentId,
    pub stage: String,
    pub round_number: u32,
    pub match_count: usize,
}

/// A match result was recorded. `winner_team_id` is `None` for draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCompleted {
    pub tournament_id: TournamentId,
    pub match_id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_score: i32,
    pub away_score: i32,
    pub winner_team_id: Option<TeamId>,
}

/// The organiser must submit a draw for the named round (manual scheduling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDrawRequired {
    pub tournament_id: TournamentId,
    pub round_number: u32,
}

/// The organiser must pick which teams advance from the group stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualQualificationRequired {
    pub tournament_id: TournamentId,
}

/// Knockout qualification is settled; carries the advancing teams in seed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationConfirmed {
    pub tournament_id: TournamentId,
    pub qualified_team_ids: Vec<TeamId>,
}

/// The tournament reached `Completed` with a decided winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentFinalized {
    pub tournament_id: TournamentId,
    pub winner_team_id: TeamId,
}

/// The tournament was cancelled before completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentCancelled {
    pub tournament_id: TournamentId,
}

/// All domain events this core can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    TournamentStatusChanged(TournamentStatusChanged),
    TeamRegistered(TeamRegistered),
    TeamWithdrawn(TeamWithdrawn),
    MatchesGenerated(MatchesGenerated),
    MatchCompleted(MatchCompleted),
    ManualDrawRequired(ManualDrawRequired),
    ManualQualificationRequired(ManualQualificationRequired),
    QualificationConfirmed(QualificationConfirmed),
    TournamentFinalized(TournamentFinalized),
    TournamentCancelled(TournamentCancelled),
}

impl DomainEvent {
    /// The stable tag persisted alongside the payload.
    pub fn type_tag(&self) -> &'static str {
        match self {
            DomainEvent::TournamentStatusChanged(_) => "tournament.status_changed",
            DomainEvent::TeamRegistered(_) => "tournament.team_registered",
            DomainEvent::TeamWithdrawn(_) => "tournament.team_withdrawn",
            DomainEvent::MatchesGenerated(_) => "tournament.matches_generated",
            DomainEvent::MatchCompleted(_) => "match.completed",
            DomainEvent::ManualDrawRequired(_) => "tournament.manual_draw_required",
            DomainEvent::ManualQualificationRequired(_) => {
                "tournament.manual_qualification_required"
            }
            DomainEvent::QualificationConfirmed(_) => "tournament.qualification_confirmed",
            DomainEvent::TournamentFinalized(_) => "tournament.finalized",
            DomainEvent::TournamentCancelled(_) => "tournament.cancelled",
        }
    }

    /// The tournament this event belongs to.
    pub fn tournament_id(&self) -> TournamentId {
        match self {
            DomainEvent::TournamentStatusChanged(e) => e.tournament_id,
            DomainEvent::TeamRegistered(e) => e.tournament_id,
            DomainEvent::TeamWithdrawn(e) => e.tournament_id,
            DomainEvent::MatchesGenerated(e) => e.tournament_id,
            DomainEvent::MatchCompleted(e) => e.tournament_id,
            DomainEvent::ManualDrawRequired(e) => e.tournament_id,
            DomainEvent::ManualQualificationRequired(e) => e.tournament_id,
            DomainEvent::QualificationConfirmed(e) => e.tournament_id,
            DomainEvent::TournamentFinalized(e) => e.tournament_id,
            DomainEvent::TournamentCancelled(e) => e.tournament_id,
        }
    }

    /// Serialize the payload (without the tag) for outbox storage.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            DomainEvent::TournamentStatusChanged(e) => serde_json::to_value(e),
            DomainEvent::TeamRegistered(e) => serde_json::to_value(e),
            DomainEvent::TeamWithdrawn(e) => serde_json::to_value(e),
            DomainEvent::MatchesGenerated(e) => serde_json::to_value(e),
            DomainEvent::MatchCompleted(e) => serde_json::to_value(e),
            DomainEvent::ManualDrawRequired(e) => serde_json::to_value(e),
            DomainEvent::ManualQualificationRequired(e) => serde_json::to_value(e),
            DomainEvent::QualificationConfirmed(e) => serde_json::to_value(e),
            DomainEvent::TournamentFinalized(e) => serde_json::to_value(e),
            DomainEvent::TournamentCancelled(e) => serde_json::to_value(e),
        }
    }

    /// Tag → decoder table for every known event type.
    ///
    /// This is the explicit compile-time registry source; adding an event
    /// means adding a variant, a tag, and a row here.
    pub fn decoders() -> &'static [(&'static str, EventDecodeFn)] {
        &[
            ("tournament.status_changed", |v| {
                serde_json::from_value::<TournamentStatusChanged>(v)
                    .map(DomainEvent::TournamentStatusChanged)
            }),
            ("tournament.team_registered", |v| {
                serde_json::from_value::<TeamRegistered>(v).map(DomainEvent::TeamRegistered)
            }),
            ("tournament.team_withdrawn", |v| {
                serde_json::from_value::<TeamWithdrawn>(v).map(DomainEvent::TeamWithdrawn)
            }),
            ("tournament.matches_generated", |v| {
                serde_json::from_value::<MatchesGenerated>(v).map(DomainEvent::MatchesGenerated)
            }),
            ("match.completed", |v| {
                serde_json::from_value::<MatchCompleted>(v).map(DomainEvent::MatchCompleted)
            }),
            ("tournament.manual_draw_required", |v| {
                serde_json::from_value::<ManualDrawRequired>(v).map(DomainEvent::ManualDrawRequired)
            }),
            ("tournament.manual_qualification_required", |v| {
                serde_json::from_value::<ManualQualificationRequired>(v)
                    .map(DomainEvent::ManualQualificationRequired)
            }),
            ("tournament.qualification_confirmed", |v| {
                serde_json::from_value::<QualificationConfirmed>(v)
                    .map(DomainEvent::QualificationConfirmed)
            }),
            ("tournament.finalized", |v| {
                serde_json::from_value::<TournamentFinalized>(v)
                    .map(DomainEvent::TournamentFinalized)
            }),
            ("tournament.cancelled", |v| {
                serde_json::from_value::<TournamentCancelled>(v)
                    .map(DomainEvent::TournamentCancelled)
            }),
        ]
    }
}
