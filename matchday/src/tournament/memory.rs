//! In-memory tournament store for single-node deployments and tests.

use super::models::{
    Match, MatchId, MatchStatus, RegistrationStatus, TeamRegistration, Tournament, TournamentId,
    TournamentStatus,
};
use super::store::{NewTournament, SaveChanges, StoreError, StoreResult, TournamentStore};
use crate::outbox::{NewOutboxMessage, OutboxStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    tournaments: Vec<Tournament>,
    registrations: Vec<TeamRegistration>,
    matches: Vec<Match>,
    next_tournament_id: TournamentId,
    next_registration_id: i64,
    next_match_id: MatchId,
}

/// Tournament entities held in process memory. One mutex over the whole
/// state makes `save` exactly as atomic as the Postgres transaction;
/// drained events then land in the injected outbox store, with the
/// per-tournament lifecycle lock serializing the two steps per tournament.
pub struct MemoryTournamentStore {
    state: Mutex<State>,
    outbox: Arc<dyn OutboxStore>,
}

impl MemoryTournamentStore {
    pub fn new(outbox: Arc<dyn OutboxStore>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            outbox,
        }
    }
}

#[async_trait]
impl TournamentStore for MemoryTournamentStore {
    async fn create(&self, new: NewTournament) -> StoreResult<Tournament> {
        let mut state = self.state.lock().await;
        state.next_tournament_id += 1;
        let now = Utc::now();
        let tournament = Tournament::from_parts(
            state.next_tournament_id,
            new.name,
            TournamentStatus::Draft,
            new.mode,
            new.scheduling_mode,
            new.number_of_groups,
            new.min_teams,
            new.max_teams,
            None,
            None,
            new.require_opening_selection,
            None,
            now,
            now,
        );
        state.tournaments.push(tournament.clone());
        Ok(tournament)
    }

    async fn get(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let state = self.state.lock().await;
        Ok(state.tournaments.iter().find(|t| t.id == id).cloned())
    }

    async fn registrations(&self, id: TournamentId) -> StoreResult<Vec<TeamRegistration>> {
        let state = self.state.lock().await;
        Ok(state
            .registrations
            .iter()
            .filter(|r| r.tournament_id == id)
            .cloned()
            .collect())
    }

    async fn matches(&self, id: TournamentId) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        let mut matches: Vec<Match> = state
            .matches
            .iter()
            .filter(|m| m.tournament_id == id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.kickoff_at.cmp(&b.kickoff_at).then(a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn get_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        let state = self.state.lock().await;
        Ok(state.matches.iter().find(|m| m.id == match_id).cloned())
    }

    async fn active_tournament_ids(&self) -> StoreResult<Vec<TournamentId>> {
        let state = self.state.lock().await;
        Ok(state
            .tournaments
            .iter()
            .filter(|t| t.status == TournamentStatus::Active)
            .map(|t| t.id)
            .collect())
    }

    async fn save(&self, tournament: &mut Tournament, changes: SaveChanges) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if !state.tournaments.iter().any(|t| t.id == tournament.id) {
            return Err(StoreError::TournamentNotFound(tournament.id));
        }

        // Validate everything up front so a failure leaves no partial state,
        // mirroring the transactional rollback of the Postgres store.
        if let Some(completed) = &changes.completed_match {
            if !state.matches.iter().any(|m| m.id == completed.match_id) {
                return Err(StoreError::MatchNotFound(completed.match_id));
            }
        }
        for team_id in &changes.new_registrations {
            let duplicate = state
                .registrations
                .iter()
                .any(|r| r.tournament_id == tournament.id && r.team_id == *team_id);
            if duplicate {
                return Err(StoreError::DuplicateRegistration {
                    tournament_id: tournament.id,
                    team_id: *team_id,
                });
            }
        }

        if let Some(completed) = &changes.completed_match {
            if let Some(m) = state
                .matches
                .iter_mut()
                .find(|m| m.id == completed.match_id)
            {
                m.status = MatchStatus::Completed;
                m.home_score = Some(completed.home_score);
                m.away_score = Some(completed.away_score);
            }
        }

        if let Some(round) = changes.cancel_scheduled_in_round {
            let tournament_id = tournament.id;
            for m in state.matches.iter_mut().filter(|m| {
                m.tournament_id == tournament_id
                    && m.round_number == round
                    && m.group_index.is_none()
                    && m.status == MatchStatus::Scheduled
            }) {
                m.status = MatchStatus::Cancelled;
            }
        }

        for team_id in &changes.new_registrations {
            state.next_registration_id += 1;
            let id = state.next_registration_id;
            state.registrations.push(TeamRegistration {
                id,
                tournament_id: tournament.id,
                team_id: *team_id,
                status: RegistrationStatus::Pending,
                group_index: None,
                qualified_for_knockout: None,
                registered_at: now,
            });
        }

        for update in &changes.registration_updates {
            if let Some(registration) = state
                .registrations
                .iter_mut()
                .find(|r| r.tournament_id == tournament.id && r.team_id == update.team_id)
            {
                if let Some(status) = update.status {
                    registration.status = status;
                }
                if let Some(group) = update.group_index {
                    registration.group_index = Some(group);
                }
                if let Some(qualified) = update.qualified_for_knockout {
                    registration.qualified_for_knockout = Some(qualified);
                }
            }
        }

        for planned in &changes.new_matches {
            state.next_match_id += 1;
            let id = state.next_match_id;
            state.matches.push(Match {
                id,
                tournament_id: tournament.id,
                home_team_id: planned.home_team_id,
                away_team_id: planned.away_team_id,
                group_index: planned.group_index,
                round_number: planned.round_number,
                stage: planned.stage.clone(),
                status: MatchStatus::Scheduled,
                home_score: None,
                away_score: None,
                kickoff_at: planned.kickoff_at,
                is_opening_match: planned.is_opening_match,
            });
        }

        // Drain before snapshotting so the stored copy carries no pending
        // events to re-emit on a later save.
        let events = tournament.take_pending_events();
        tournament.updated_at = now;
        let snapshot = tournament.clone();
        if let Some(stored) = state
            .tournaments
            .iter_mut()
            .find(|t| t.id == tournament.id)
        {
            *stored = snapshot;
        }
        drop(state);

        if !events.is_empty() {
            let mut rows = Vec::with_capacity(events.len());
            for event in &events {
                rows.push(NewOutboxMessage::from_event(event, now)?);
            }
            self.outbox.append(rows).await.map_err(|e| match e {
                crate::outbox::OutboxError::Database(db) => StoreError::Database(db),
                crate::outbox::OutboxError::Serialization(s) => StoreError::Serialization(s),
            })?;
        }

        Ok(())
    }
}
