//! Tournament lifecycle orchestration.
//!
//! Every operation here follows the same discipline: take the per-tournament
//! lock for the whole operation, load state, validate, mutate the aggregate
//! (recording domain events), and persist everything in one atomic
//! [`TournamentStore::save`] call. Decisions come back as a
//! [`LifecycleOutcome`] so callers can notify without this service knowing
//! any notification channel.

use super::models::{
    InvalidTransition, Match, MatchId, MatchStatus, RegistrationStatus, SchedulingMode,
    TeamId, TeamRegistration, Tournament, TournamentId, TournamentStatus,
};
use super::outcome::LifecycleOutcome;
use super::standings::{group_standings, standings};
use super::store::{
    CompletedMatch, NewTournament, RegistrationUpdate, SaveChanges, StoreError, TournamentStore,
};
use crate::events::{
    DomainEvent, ManualDrawRequired, ManualQualificationRequired, MatchCompleted,
    MatchesGenerated, QualificationConfirmed, TeamRegistered, TeamWithdrawn, TournamentCancelled,
    TournamentFinalized,
};
use crate::lock::{LockGuard, LockManager};
use crate::schedule::{
    GROUP_STAGE, LEAGUE_STAGE, ManualDraw, ROUND_SPACING_DAYS, ScheduleError,
    distribute_into_groups, knockout_round, plan_from_group_draw, plan_from_knockout_draw,
    round_robin, validate_group_draw, validate_knockout_draw,
};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle operation errors
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("tournament not found: {0}")]
    NotFound(TournamentId),

    /// The per-tournament lock is held by a competing operation. Surfaced
    /// immediately; never retried here.
    #[error("tournament {0} is busy with another operation")]
    Busy(TournamentId),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("operation requires status {expected:?}, tournament {id} is {actual:?}")]
    WrongStatus {
        id: TournamentId,
        expected: TournamentStatus,
        actual: TournamentStatus,
    },

    #[error("team {team_id} is already registered for tournament {tournament_id}")]
    AlreadyRegistered {
        tournament_id: TournamentId,
        team_id: TeamId,
    },

    #[error("tournament {id} is full ({max} teams)")]
    TournamentFull { id: TournamentId, max: u32 },

    #[error("team {team_id} has no registration in tournament {tournament_id}")]
    RegistrationNotFound {
        tournament_id: TournamentId,
        team_id: TeamId,
    },

    #[error("{0:?} is not a valid review decision")]
    InvalidReviewDecision(RegistrationStatus),

    #[error("tournament {id} needs between {min} and {max} approved teams, has {got}")]
    TeamCountOutOfRange {
        id: TournamentId,
        min: u32,
        max: u32,
        got: usize,
    },

    #[error("match {0} does not belong here or is no longer open for results")]
    MatchNotOpen(MatchId),

    #[error("scores must be non-negative")]
    NegativeScore,

    #[error("knockout ties must produce a winner")]
    DrawNotAllowed,

    #[error("match {0} has no decided winner")]
    NoWinner(MatchId),

    #[error("draw targets round {got}, expected round {expected}")]
    WrongRound { expected: u32, got: u32 },

    #[error("a manual draw is not expected for this tournament right now")]
    ManualDrawNotExpected,

    #[error("draw shape does not match the tournament mode")]
    DrawShapeMismatch,

    #[error("qualification list invalid: {0}")]
    InvalidQualification(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// The tournament lifecycle state machine service.
pub struct TournamentLifecycle {
    store: Arc<dyn TournamentStore>,
    locks: Arc<LockManager>,
}

impl TournamentLifecycle {
    pub fn new(store: Arc<dyn TournamentStore>, locks: Arc<LockManager>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn TournamentStore> {
        &self.store
    }

    /// Create a tournament in `Draft`.
    pub async fn create(&self, new: NewTournament) -> LifecycleResult<Tournament> {
        Ok(self.store.create(new).await?)
    }

    /// `Draft -> RegistrationOpen`.
    pub async fn open_registration(&self, id: TournamentId) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            tournament.transition_to(TournamentStatus::RegistrationOpen)?;
            self.store.save(&mut tournament, SaveChanges::default()).await?;
            Ok(LifecycleOutcome::idle(id, tournament.status))
        }
        .await;
        guard.release().await;
        result
    }

    /// Register a team while registration is open. A withdrawn or rejected
    /// team may register again; anyone still holding a slot conflicts.
    pub async fn register_team(
        &self,
        id: TournamentId,
        team_id: TeamId,
    ) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::RegistrationOpen)?;

            let registrations = self.store.registrations(id).await?;
            let occupied = registrations
                .iter()
                .filter(|r| r.status.occupies_slot())
                .count();
            if occupied >= tournament.max_teams as usize {
                return Err(LifecycleError::TournamentFull {
                    id,
                    max: tournament.max_teams,
                });
            }

            let mut changes = SaveChanges::default();
            match registrations.iter().find(|r| r.team_id == team_id) {
                Some(existing) if existing.status.occupies_slot() => {
                    return Err(LifecycleError::AlreadyRegistered {
                        tournament_id: id,
                        team_id,
                    });
                }
                Some(_) => {
                    // Coming back after a withdrawal or rejection.
                    changes.registration_updates.push(RegistrationUpdate {
                        team_id,
                        status: Some(RegistrationStatus::Pending),
                        ..RegistrationUpdate::default()
                    });
                }
                None => changes.new_registrations.push(team_id),
            }

            tournament.record_event(DomainEvent::TeamRegistered(TeamRegistered {
                tournament_id: id,
                team_id,
            }));

            match self.store.save(&mut tournament, changes).await {
                Ok(()) => Ok(LifecycleOutcome::idle(id, tournament.status)),
                Err(StoreError::DuplicateRegistration { .. }) => {
                    Err(LifecycleError::AlreadyRegistered {
                        tournament_id: id,
                        team_id,
                    })
                }
                Err(e) => Err(e.into()),
            }
        }
        .await;
        guard.release().await;
        result
    }

    /// Settle a pending registration: approve, reject, or park it for
    /// payment review.
    pub async fn review_registration(
        &self,
        id: TournamentId,
        team_id: TeamId,
        decision: RegistrationStatus,
    ) -> LifecycleResult<LifecycleOutcome> {
        if !matches!(
            decision,
            RegistrationStatus::Approved
                | RegistrationStatus::Rejected
                | RegistrationStatus::PendingPaymentReview
        ) {
            return Err(LifecycleError::InvalidReviewDecision(decision));
        }

        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::RegistrationOpen)?;

            let registrations = self.store.registrations(id).await?;
            let registration = registrations
                .iter()
                .find(|r| r.team_id == team_id && r.status.occupies_slot())
                .ok_or(LifecycleError::RegistrationNotFound {
                    tournament_id: id,
                    team_id,
                })?;

            let mut changes = SaveChanges::default();
            changes.registration_updates.push(RegistrationUpdate {
                team_id: registration.team_id,
                status: Some(decision),
                ..RegistrationUpdate::default()
            });
            self.store.save(&mut tournament, changes).await?;
            Ok(LifecycleOutcome::idle(id, tournament.status))
        }
        .await;
        guard.release().await;
        result
    }

    /// Withdraw a team before registration closes.
    pub async fn withdraw_team(
        &self,
        id: TournamentId,
        team_id: TeamId,
    ) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::RegistrationOpen)?;

            let registrations = self.store.registrations(id).await?;
            if !registrations
                .iter()
                .any(|r| r.team_id == team_id && r.status.occupies_slot())
            {
                return Err(LifecycleError::RegistrationNotFound {
                    tournament_id: id,
                    team_id,
                });
            }

            let mut changes = SaveChanges::default();
            changes.registration_updates.push(RegistrationUpdate {
                team_id,
                status: Some(RegistrationStatus::Withdrawn),
                ..RegistrationUpdate::default()
            });
            tournament.record_event(DomainEvent::TeamWithdrawn(TeamWithdrawn {
                tournament_id: id,
                team_id,
            }));
            self.store.save(&mut tournament, changes).await?;
            Ok(LifecycleOutcome::idle(id, tournament.status))
        }
        .await;
        guard.release().await;
        result
    }

    /// Designate the marquee opening pairing. Allowed while configuring or
    /// registering; in `WaitingForOpeningMatchSelection` the pick also
    /// triggers schedule generation and starts play.
    pub async fn select_opening_pair(
        &self,
        id: TournamentId,
        team_a: TeamId,
        team_b: TeamId,
    ) -> LifecycleResult<LifecycleOutcome> {
        if team_a == team_b {
            return Err(ScheduleError::OpeningPairSameTeam.into());
        }

        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            match tournament.status {
                TournamentStatus::Draft | TournamentStatus::RegistrationOpen => {
                    tournament.opening_team_a = Some(team_a);
                    tournament.opening_team_b = Some(team_b);
                    self.store.save(&mut tournament, SaveChanges::default()).await?;
                    Ok(LifecycleOutcome::idle(id, tournament.status))
                }
                TournamentStatus::WaitingForOpeningMatchSelection => {
                    let registrations = self.store.registrations(id).await?;
                    let approved = approved_team_ids(&registrations);
                    for team in [team_a, team_b] {
                        if !approved.contains(&team) {
                            return Err(ScheduleError::OpeningTeamUnknown(team).into());
                        }
                    }
                    tournament.opening_team_a = Some(team_a);
                    tournament.opening_team_b = Some(team_b);

                    let mut changes = SaveChanges::default();
                    let mut outcome = LifecycleOutcome::idle(id, tournament.status);
                    self.generate_opening_stage(
                        &mut tournament,
                        &approved,
                        &mut changes,
                        &mut outcome,
                    )?;
                    outcome.status = tournament.status;
                    self.store.save(&mut tournament, changes).await?;
                    Ok(outcome)
                }
                actual => Err(LifecycleError::WrongStatus {
                    id,
                    expected: TournamentStatus::WaitingForOpeningMatchSelection,
                    actual,
                }),
            }
        }
        .await;
        guard.release().await;
        result
    }

    /// Close registration. Automatic scheduling generates the opening stage
    /// inline; manual scheduling stops and asks the organiser for a draw.
    pub async fn close_registration(&self, id: TournamentId) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::RegistrationOpen)?;

            let registrations = self.store.registrations(id).await?;
            let approved = approved_team_ids(&registrations);
            if approved.len() < tournament.min_teams as usize
                || approved.len() > tournament.max_teams as usize
            {
                return Err(LifecycleError::TeamCountOutOfRange {
                    id,
                    min: tournament.min_teams,
                    max: tournament.max_teams,
                    got: approved.len(),
                });
            }

            tournament.transition_to(TournamentStatus::RegistrationClosed)?;

            let mut changes = SaveChanges::default();
            let mut outcome = LifecycleOutcome::idle(id, tournament.status);
            if tournament.scheduling_mode == SchedulingMode::Manual {
                tournament.record_event(DomainEvent::ManualDrawRequired(ManualDrawRequired {
                    tournament_id: id,
                    round_number: 1,
                }));
                outcome.manual_draw_required = true;
            } else if tournament.require_opening_selection && tournament.opening_pair().is_none() {
                tournament.transition_to(TournamentStatus::WaitingForOpeningMatchSelection)?;
            } else {
                self.generate_opening_stage(&mut tournament, &approved, &mut changes, &mut outcome)?;
            }

            outcome.status = tournament.status;
            self.store.save(&mut tournament, changes).await?;
            Ok(outcome)
        }
        .await;
        guard.release().await;
        result
    }

    /// Accept an organiser-submitted draw. Validation is all-or-nothing: a
    /// rejected draw mutates nothing.
    pub async fn submit_manual_draw(
        &self,
        id: TournamentId,
        draw: ManualDraw,
    ) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            if tournament.scheduling_mode != SchedulingMode::Manual {
                return Err(LifecycleError::ManualDrawNotExpected);
            }

            let registrations = self.store.registrations(id).await?;
            let mut changes = SaveChanges::default();
            let mut outcome = LifecycleOutcome::idle(id, tournament.status);

            match draw {
                ManualDraw::Groups(assignments) => {
                    self.require_status(&tournament, TournamentStatus::RegistrationClosed)?;
                    if !tournament.mode.has_group_stage() {
                        return Err(LifecycleError::DrawShapeMismatch);
                    }
                    let eligible = approved_team_ids(&registrations);
                    validate_group_draw(&assignments, &eligible, tournament.number_of_groups)?;

                    let pair = tournament.opening_pair();
                    let plans = plan_from_group_draw(
                        &assignments,
                        false,
                        pair.as_ref(),
                        self.generation_anchor(),
                    )?;
                    for assignment in &assignments {
                        for team_id in &assignment.team_ids {
                            changes.registration_updates.push(RegistrationUpdate {
                                team_id: *team_id,
                                group_index: Some(assignment.group_index),
                                ..RegistrationUpdate::default()
                            });
                        }
                    }
                    record_generated(&mut tournament, GROUP_STAGE, 1, plans.len());
                    changes.new_matches = plans;
                    tournament.transition_to(TournamentStatus::Active)?;
                    outcome.next_round_generated = true;
                    outcome.generated_round = Some(1);
                }
                ManualDraw::Knockout(pairings) => {
                    if tournament.mode.is_league() {
                        return Err(LifecycleError::DrawShapeMismatch);
                    }
                    let round = pairings.first().map(|p| p.round_number).unwrap_or(0);
                    let two_legged = tournament.mode.two_legged_knockout();
                    let pair = tournament.opening_pair();

                    match tournament.status {
                        TournamentStatus::RegistrationClosed => {
                            if tournament.mode.has_group_stage() {
                                // Group modes open with a group draw, never a bracket.
                                return Err(LifecycleError::DrawShapeMismatch);
                            }
                            if round != 1 {
                                return Err(LifecycleError::WrongRound {
                                    expected: 1,
                                    got: round,
                                });
                            }
                            let eligible = approved_team_ids(&registrations);
                            validate_knockout_draw(&pairings, &eligible)?;
                            let plans = plan_from_knockout_draw(
                                &pairings,
                                two_legged,
                                pair.as_ref(),
                                self.generation_anchor(),
                            );
                            record_generated(
                                &mut tournament,
                                &plans[0].stage,
                                round,
                                plans.len(),
                            );
                            changes.new_matches = plans;
                            tournament.transition_to(TournamentStatus::Active)?;
                            outcome.next_round_generated = true;
                            outcome.generated_round = Some(round);
                        }
                        TournamentStatus::Active => {
                            let matches = self.store.matches(id).await?;
                            let knockout: Vec<&Match> = matches
                                .iter()
                                .filter(|m| m.is_knockout() && m.status != MatchStatus::Cancelled)
                                .collect();
                            let Some(max_round) =
                                knockout.iter().map(|m| m.round_number).max()
                            else {
                                return Err(LifecycleError::ManualDrawNotExpected);
                            };
                            let current: Vec<&Match> = knockout
                                .iter()
                                .copied()
                                .filter(|m| m.round_number == max_round)
                                .collect();

                            if round == max_round
                                && current.iter().all(|m| m.status == MatchStatus::Scheduled)
                            {
                                // Replace a still-scheduled round — notably the
                                // auto-seeded first knockout round right after a
                                // manual qualification confirmation.
                                let mut eligible: Vec<TeamId> = current
                                    .iter()
                                    .flat_map(|m| [m.home_team_id, m.away_team_id])
                                    .collect();
                                eligible.sort_unstable();
                                eligible.dedup();
                                validate_knockout_draw(&pairings, &eligible)?;
                                changes.cancel_scheduled_in_round = Some(round);
                                let plans = plan_from_knockout_draw(
                                    &pairings,
                                    two_legged,
                                    if round == 1 { pair.as_ref() } else { None },
                                    self.generation_anchor(),
                                );
                                record_generated(
                                    &mut tournament,
                                    &plans[0].stage,
                                    round,
                                    plans.len(),
                                );
                                changes.new_matches = plans;
                            } else if round == max_round + 1
                                && current.iter().all(|m| m.status.is_terminal())
                            {
                                let winners = pair_winners(&current, two_legged)?;
                                validate_knockout_draw(&pairings, &winners)?;
                                let plans = plan_from_knockout_draw(
                                    &pairings,
                                    two_legged,
                                    None,
                                    self.generation_anchor(),
                                );
                                record_generated(
                                    &mut tournament,
                                    &plans[0].stage,
                                    round,
                                    plans.len(),
                                );
                                changes.new_matches = plans;
                            } else {
                                return Err(LifecycleError::WrongRound {
                                    expected: max_round + 1,
                                    got: round,
                                });
                            }
                            outcome.next_round_generated = true;
                            outcome.generated_round = Some(round);
                        }
                        actual => {
                            return Err(LifecycleError::WrongStatus {
                                id,
                                expected: TournamentStatus::Active,
                                actual,
                            });
                        }
                    }
                }
            }

            outcome.status = tournament.status;
            outcome.generated_match_count = changes.new_matches.len();
            self.store.save(&mut tournament, changes).await?;
            Ok(outcome)
        }
        .await;
        guard.release().await;
        result
    }

    /// Organiser-driven qualification: pick which approved teams advance to
    /// the knockout bracket, in seed order. Seeds round 1 and resumes play.
    pub async fn confirm_qualification(
        &self,
        id: TournamentId,
        team_ids: Vec<TeamId>,
    ) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::ManualQualificationPending)?;

            let registrations = self.store.registrations(id).await?;
            let approved = approved_team_ids(&registrations);

            if team_ids.len() < 2 || team_ids.len() % 2 != 0 {
                return Err(LifecycleError::InvalidQualification(format!(
                    "need an even number of qualifiers, got {}",
                    team_ids.len()
                )));
            }
            let mut unique = team_ids.clone();
            unique.sort_unstable();
            unique.dedup();
            if unique.len() != team_ids.len() {
                return Err(LifecycleError::InvalidQualification(
                    "duplicate team in qualification list".to_string(),
                ));
            }
            for team in &team_ids {
                if !approved.contains(team) {
                    return Err(LifecycleError::InvalidQualification(format!(
                        "team {team} is not an approved participant"
                    )));
                }
            }
            if registrations
                .iter()
                .any(|r| r.qualified_for_knockout.is_some())
            {
                return Err(LifecycleError::InvalidQualification(
                    "qualification has already been settled".to_string(),
                ));
            }

            let mut changes = SaveChanges::default();
            for team in &approved {
                changes.registration_updates.push(RegistrationUpdate {
                    team_id: *team,
                    qualified_for_knockout: Some(team_ids.contains(team)),
                    ..RegistrationUpdate::default()
                });
            }

            tournament.transition_to(TournamentStatus::QualificationConfirmed)?;
            tournament.record_event(DomainEvent::QualificationConfirmed(QualificationConfirmed {
                tournament_id: id,
                qualified_team_ids: team_ids.clone(),
            }));

            let mut outcome = LifecycleOutcome::idle(id, tournament.status);
            self.generate_first_knockout_round(
                &mut tournament,
                &team_ids,
                false,
                &mut changes,
                &mut outcome,
            )?;

            outcome.status = tournament.status;
            self.store.save(&mut tournament, changes).await?;
            Ok(outcome)
        }
        .await;
        guard.release().await;
        result
    }

    /// Record a final score and immediately run the progression decision
    /// while still holding the tournament lock.
    pub async fn record_match_result(
        &self,
        id: TournamentId,
        match_id: MatchId,
        home_score: i32,
        away_score: i32,
    ) -> LifecycleResult<LifecycleOutcome> {
        if home_score < 0 || away_score < 0 {
            return Err(LifecycleError::NegativeScore);
        }

        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            self.require_status(&tournament, TournamentStatus::Active)?;

            let mut matches = self.store.matches(id).await?;
            let registrations = self.store.registrations(id).await?;

            let target = matches
                .iter()
                .find(|m| m.id == match_id)
                .ok_or(LifecycleError::MatchNotOpen(match_id))?
                .clone();
            if target.status.is_terminal() {
                return Err(LifecycleError::MatchNotOpen(match_id));
            }

            if target.is_knockout() {
                self.check_knockout_result(&tournament, &matches, &target, home_score, away_score)?;
            }

            let winner = if home_score > away_score {
                Some(target.home_team_id)
            } else if away_score > home_score {
                Some(target.away_team_id)
            } else {
                None
            };
            tournament.record_event(DomainEvent::MatchCompleted(MatchCompleted {
                tournament_id: id,
                match_id,
                home_team_id: target.home_team_id,
                away_team_id: target.away_team_id,
                home_score,
                away_score,
                winner_team_id: winner,
            }));

            let mut changes = SaveChanges {
                completed_match: Some(CompletedMatch {
                    match_id,
                    home_score,
                    away_score,
                }),
                ..SaveChanges::default()
            };

            // Run the decision against the post-result view of the matches.
            if let Some(m) = matches.iter_mut().find(|m| m.id == match_id) {
                m.status = MatchStatus::Completed;
                m.home_score = Some(home_score);
                m.away_score = Some(away_score);
            }

            let mut outcome = LifecycleOutcome::idle(id, tournament.status);
            self.decide(&mut tournament, &matches, &registrations, &mut changes, &mut outcome)?;

            outcome.status = tournament.status;
            self.store.save(&mut tournament, changes).await?;
            Ok(outcome)
        }
        .await;
        guard.release().await;
        result
    }

    /// Decision point: finalize, generate the next round, or flag the
    /// organiser. Safe to call at any time; a tournament with nothing to
    /// decide returns an idle outcome.
    pub async fn check_and_finalize(&self, id: TournamentId) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            if tournament.status != TournamentStatus::Active {
                return Ok(LifecycleOutcome::idle(id, tournament.status));
            }

            let matches = self.store.matches(id).await?;
            let registrations = self.store.registrations(id).await?;

            let mut changes = SaveChanges::default();
            let mut outcome = LifecycleOutcome::idle(id, tournament.status);
            self.decide(&mut tournament, &matches, &registrations, &mut changes, &mut outcome)?;
            outcome.status = tournament.status;

            if !changes.is_empty() || !tournament.pending_events().is_empty() {
                self.store.save(&mut tournament, changes).await?;
            }
            Ok(outcome)
        }
        .await;
        guard.release().await;
        result
    }

    /// Abandon a tournament from any non-terminal status.
    pub async fn cancel(&self, id: TournamentId) -> LifecycleResult<LifecycleOutcome> {
        let guard = self.lock(id).await?;
        let result = async {
            let mut tournament = self.load(id).await?;
            tournament.transition_to(TournamentStatus::Cancelled)?;
            tournament.record_event(DomainEvent::TournamentCancelled(TournamentCancelled {
                tournament_id: id,
            }));
            self.store.save(&mut tournament, SaveChanges::default()).await?;
            info!("tournament {id} cancelled");
            Ok(LifecycleOutcome::idle(id, tournament.status))
        }
        .await;
        guard.release().await;
        result
    }

    async fn lock(&self, id: TournamentId) -> LifecycleResult<LockGuard> {
        self.locks
            .acquire_tournament(id)
            .await
            .ok_or(LifecycleError::Busy(id))
    }

    async fn load(&self, id: TournamentId) -> LifecycleResult<Tournament> {
        self.store
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    fn require_status(
        &self,
        tournament: &Tournament,
        expected: TournamentStatus,
    ) -> LifecycleResult<()> {
        if tournament.status != expected {
            return Err(LifecycleError::WrongStatus {
                id: tournament.id,
                expected,
                actual: tournament.status,
            });
        }
        Ok(())
    }

    fn generation_anchor(&self) -> DateTime<Utc> {
        Utc::now() + Duration::days(ROUND_SPACING_DAYS)
    }

    /// Generate the opening stage for the tournament's mode and move it to
    /// `Active`. `approved` teams are shuffled here; the engine itself is
    /// deterministic in its input order.
    fn generate_opening_stage(
        &self,
        tournament: &mut Tournament,
        approved: &[TeamId],
        changes: &mut SaveChanges,
        outcome: &mut LifecycleOutcome,
    ) -> LifecycleResult<()> {
        let pair = tournament.opening_pair();
        let anchor = self.generation_anchor();

        if tournament.mode.is_league() {
            let mut order = approved.to_vec();
            order.shuffle(&mut rand::rng());
            let plans = round_robin(
                &order,
                tournament.mode.double_round(),
                pair.as_ref(),
                anchor,
                None,
                LEAGUE_STAGE,
            )?;
            record_generated(tournament, LEAGUE_STAGE, 1, plans.len());
            outcome.generated_match_count = plans.len();
            changes.new_matches.extend(plans);
            tournament.transition_to(TournamentStatus::Active)?;
            outcome.next_round_generated = true;
            outcome.generated_round = Some(1);
            return Ok(());
        }

        if tournament.mode.has_group_stage() {
            let groups = distribute_into_groups(
                approved,
                tournament.number_of_groups,
                pair.as_ref(),
                &mut rand::rng(),
            )?;
            let mut plans = Vec::new();
            for (index, members) in groups.iter().enumerate() {
                let group_index = index as u32;
                for team_id in members {
                    changes.registration_updates.push(RegistrationUpdate {
                        team_id: *team_id,
                        group_index: Some(group_index),
                        ..RegistrationUpdate::default()
                    });
                }
                let pair_here = pair
                    .filter(|p| members.contains(&p.team_a) && members.contains(&p.team_b));
                plans.extend(round_robin(
                    members,
                    false,
                    pair_here.as_ref(),
                    anchor,
                    Some(group_index),
                    GROUP_STAGE,
                )?);
            }
            record_generated(tournament, GROUP_STAGE, 1, plans.len());
            outcome.generated_match_count = plans.len();
            changes.new_matches.extend(plans);
            tournament.transition_to(TournamentStatus::Active)?;
            outcome.next_round_generated = true;
            outcome.generated_round = Some(1);
            return Ok(());
        }

        self.generate_first_knockout_round(tournament, approved, true, changes, outcome)
    }

    /// Seed knockout round 1 from `seeds` and resume play. Used by automatic
    /// qualification, manual qualification confirmation, and pure-knockout
    /// openings (the latter shuffles).
    fn generate_first_knockout_round(
        &self,
        tournament: &mut Tournament,
        seeds: &[TeamId],
        shuffle: bool,
        changes: &mut SaveChanges,
        outcome: &mut LifecycleOutcome,
    ) -> LifecycleResult<()> {
        let mut order = seeds.to_vec();
        if shuffle {
            order.shuffle(&mut rand::rng());
        }
        let pair = tournament
            .opening_pair()
            .filter(|p| order.contains(&p.team_a) && order.contains(&p.team_b));

        let plans = knockout_round(
            &order,
            1,
            tournament.mode.two_legged_knockout(),
            pair.as_ref(),
            self.generation_anchor(),
        )?;
        record_generated(tournament, &plans[0].stage, 1, plans.len());
        outcome.generated_match_count = plans.len();
        changes.new_matches.extend(plans);
        if tournament.status != TournamentStatus::Active {
            tournament.transition_to(TournamentStatus::Active)?;
        }
        outcome.next_round_generated = true;
        outcome.generated_round = Some(1);
        Ok(())
    }

    /// The automated decision table behind `check_and_finalize`. Pure over
    /// the loaded state; everything it wants persisted goes through
    /// `changes` and the aggregate's recorded events.
    fn decide(
        &self,
        tournament: &mut Tournament,
        matches: &[Match],
        registrations: &[TeamRegistration],
        changes: &mut SaveChanges,
        outcome: &mut LifecycleOutcome,
    ) -> LifecycleResult<()> {
        if tournament.status != TournamentStatus::Active {
            return Ok(());
        }

        let live: Vec<&Match> = matches
            .iter()
            .filter(|m| m.status != MatchStatus::Cancelled)
            .collect();

        if tournament.mode.has_group_stage() {
            let group: Vec<&Match> = live.iter().copied().filter(|m| m.is_group_stage()).collect();
            let knockout_started = live.iter().any(|m| m.is_knockout());

            if !group.is_empty() && !knockout_started {
                if group.iter().any(|m| !m.status.is_terminal()) {
                    return Ok(());
                }
                outcome.groups_finished = true;

                if tournament.scheduling_mode == SchedulingMode::Manual {
                    tournament.transition_to(TournamentStatus::ManualQualificationPending)?;
                    tournament.record_event(DomainEvent::ManualQualificationRequired(
                        ManualQualificationRequired {
                            tournament_id: tournament.id,
                        },
                    ));
                    outcome.manual_qualification_required = true;
                    return Ok(());
                }

                let seeds =
                    automatic_qualifiers(matches, registrations, tournament.number_of_groups)?;
                for registration in registrations {
                    if registration.status == RegistrationStatus::Approved {
                        changes.registration_updates.push(RegistrationUpdate {
                            team_id: registration.team_id,
                            qualified_for_knockout: Some(seeds.contains(&registration.team_id)),
                            ..RegistrationUpdate::default()
                        });
                    }
                }
                tournament.transition_to(TournamentStatus::QualificationConfirmed)?;
                tournament.record_event(DomainEvent::QualificationConfirmed(
                    QualificationConfirmed {
                        tournament_id: tournament.id,
                        qualified_team_ids: seeds.clone(),
                    },
                ));
                return self.generate_first_knockout_round(
                    tournament,
                    &seeds,
                    false,
                    changes,
                    outcome,
                );
            }
            // Group stage behind us: fall through to the knockout logic.
        } else if tournament.mode.is_league() {
            if live.is_empty() || live.iter().any(|m| !m.status.is_terminal()) {
                return Ok(());
            }
            let teams = approved_team_ids(registrations);
            let table = standings(matches, &teams);
            let winner = table
                .first()
                .map(|row| row.team_id)
                .ok_or_else(|| {
                    LifecycleError::InvalidQualification("league has no standings".to_string())
                })?;
            return self.finalize(tournament, winner, outcome);
        }

        let knockout: Vec<&Match> = live.iter().copied().filter(|m| m.is_knockout()).collect();
        if knockout.is_empty() {
            return Ok(());
        }
        let max_round = knockout
            .iter()
            .map(|m| m.round_number)
            .max()
            .unwrap_or(1);
        let current: Vec<&Match> = knockout
            .iter()
            .copied()
            .filter(|m| m.round_number == max_round)
            .collect();
        if current.iter().any(|m| !m.status.is_terminal()) {
            return Ok(());
        }

        let two_legged = tournament.mode.two_legged_knockout();
        let winners = pair_winners(&current, two_legged)?;

        if winners.len() == 1 {
            return self.finalize(tournament, winners[0], outcome);
        }

        if tournament.scheduling_mode == SchedulingMode::Manual {
            tournament.record_event(DomainEvent::ManualDrawRequired(ManualDrawRequired {
                tournament_id: tournament.id,
                round_number: max_round + 1,
            }));
            outcome.manual_draw_required = true;
            return Ok(());
        }

        let plans = knockout_round(
            &winners,
            max_round + 1,
            two_legged,
            None,
            self.generation_anchor(),
        )?;
        record_generated(tournament, &plans[0].stage, max_round + 1, plans.len());
        outcome.next_round_generated = true;
        outcome.generated_round = Some(max_round + 1);
        outcome.generated_match_count = plans.len();
        changes.new_matches.extend(plans);
        Ok(())
    }

    fn finalize(
        &self,
        tournament: &mut Tournament,
        winner: TeamId,
        outcome: &mut LifecycleOutcome,
    ) -> LifecycleResult<()> {
        tournament.set_winner(winner);
        tournament.record_event(DomainEvent::TournamentFinalized(TournamentFinalized {
            tournament_id: tournament.id,
            winner_team_id: winner,
        }));
        tournament.transition_to(TournamentStatus::Completed)?;
        outcome.tournament_finalized = true;
        outcome.winner_team_id = Some(winner);
        info!("tournament {} finalized, winner {winner}", tournament.id);
        Ok(())
    }

    /// Reject knockout results that leave the tie undecidable: a drawn
    /// single-leg match, or a second leg that ties the aggregate with away
    /// goals level too (record the post-shootout score instead).
    fn check_knockout_result(
        &self,
        tournament: &Tournament,
        matches: &[Match],
        target: &Match,
        home_score: i32,
        away_score: i32,
    ) -> LifecycleResult<()> {
        if !tournament.mode.two_legged_knockout() {
            if home_score == away_score {
                return Err(LifecycleError::DrawNotAllowed);
            }
            return Ok(());
        }

        let sibling = matches.iter().find(|m| {
            m.id != target.id
                && m.is_knockout()
                && m.round_number == target.round_number
                && m.home_team_id == target.away_team_id
                && m.away_team_id == target.home_team_id
                && m.status == MatchStatus::Completed
        });
        let Some(first_leg) = sibling else {
            // First leg of the tie; any score stands.
            return Ok(());
        };
        let (Some(first_home), Some(first_away)) = (first_leg.home_score, first_leg.away_score)
        else {
            return Ok(());
        };

        // target.home played away in the first leg.
        let target_home_aggregate = home_score + first_away;
        let target_away_aggregate = away_score + first_home;
        if target_home_aggregate == target_away_aggregate {
            // Away goals: target.home scored `first_away` away, target.away
            // scored `away_score` away.
            if first_away == away_score {
                warn!(
                    "match {} would leave the tie level on aggregate and away goals",
                    target.id
                );
                return Err(LifecycleError::DrawNotAllowed);
            }
        }
        Ok(())
    }
}

fn approved_team_ids(registrations: &[TeamRegistration]) -> Vec<TeamId> {
    registrations
        .iter()
        .filter(|r| r.status == RegistrationStatus::Approved)
        .map(|r| r.team_id)
        .collect()
}

fn record_generated(tournament: &mut Tournament, stage: &str, round: u32, count: usize) {
    tournament.record_event(DomainEvent::MatchesGenerated(MatchesGenerated {
        tournament_id: tournament.id,
        stage: stage.to_string(),
        round_number: round,
        match_count: count,
    }));
}

/// Winners of a fully-terminal knockout round, in bracket (kickoff) order.
/// Two-legged ties aggregate both legs, breaking level aggregates on away
/// goals.
fn pair_winners(round_matches: &[&Match], two_legged: bool) -> LifecycleResult<Vec<TeamId>> {
    let mut ordered: Vec<&Match> = round_matches.to_vec();
    ordered.sort_by(|a, b| a.kickoff_at.cmp(&b.kickoff_at).then(a.id.cmp(&b.id)));

    if !two_legged {
        return ordered
            .iter()
            .map(|m| m.winner().ok_or(LifecycleError::NoWinner(m.id)))
            .collect();
    }

    struct TieAggregate {
        first_match_id: MatchId,
        home: TeamId,
        away: TeamId,
        home_goals: i32,
        away_goals: i32,
        home_away_goals: i32,
        away_away_goals: i32,
    }

    let mut order: Vec<(TeamId, TeamId)> = Vec::new();
    let mut ties: HashMap<(TeamId, TeamId), TieAggregate> = HashMap::new();

    for m in &ordered {
        let key = (
            m.home_team_id.min(m.away_team_id),
            m.home_team_id.max(m.away_team_id),
        );
        let (Some(home_score), Some(away_score)) = (m.home_score, m.away_score) else {
            return Err(LifecycleError::NoWinner(m.id));
        };
        let tie = ties.entry(key).or_insert_with(|| {
            order.push(key);
            TieAggregate {
                first_match_id: m.id,
                home: m.home_team_id,
                away: m.away_team_id,
                home_goals: 0,
                away_goals: 0,
                home_away_goals: 0,
                away_away_goals: 0,
            }
        });
        if m.home_team_id == tie.home {
            tie.home_goals += home_score;
            tie.away_goals += away_score;
            tie.away_away_goals += away_score;
        } else {
            tie.home_goals += away_score;
            tie.away_goals += home_score;
            tie.home_away_goals += away_score;
        }
    }

    let mut winners = Vec::with_capacity(order.len());
    for key in order {
        let tie = &ties[&key];
        let winner = if tie.home_goals > tie.away_goals {
            tie.home
        } else if tie.away_goals > tie.home_goals {
            tie.away
        } else if tie.home_away_goals > tie.away_away_goals {
            tie.home
        } else if tie.away_away_goals > tie.home_away_goals {
            tie.away
        } else {
            return Err(LifecycleError::NoWinner(tie.first_match_id));
        };
        winners.push(winner);
    }
    Ok(winners)
}

/// Automatic rank-based qualification: the top two of each group advance.
/// Seeds come out interleaved — each group winner meets another group's
/// runner-up in round 1.
fn automatic_qualifiers(
    matches: &[Match],
    registrations: &[TeamRegistration],
    group_count: u32,
) -> LifecycleResult<Vec<TeamId>> {
    let mut winners = Vec::with_capacity(group_count as usize);
    let mut runners_up = Vec::with_capacity(group_count as usize);

    for group_index in 0..group_count {
        let members: Vec<TeamId> = registrations
            .iter()
            .filter(|r| {
                r.status == RegistrationStatus::Approved && r.group_index == Some(group_index)
            })
            .map(|r| r.team_id)
            .collect();
        if members.len() < 2 {
            return Err(LifecycleError::InvalidQualification(format!(
                "group {group_index} has fewer than two teams"
            )));
        }
        let table = group_standings(matches, group_index, &members);
        winners.push(table[0].team_id);
        runners_up.push(table[1].team_id);
    }

    let group_count = group_count as usize;
    let mut seeds = Vec::with_capacity(group_count * 2);
    for i in 0..group_count {
        seeds.push(winners[i]);
        seeds.push(runners_up[group_count - 1 - i]);
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knockout_match(
        id: MatchId,
        home: TeamId,
        away: TeamId,
        home_score: i32,
        away_score: i32,
        kickoff_offset_hours: i64,
    ) -> Match {
        Match {
            id,
            tournament_id: 1,
            home_team_id: home,
            away_team_id: away,
            group_index: None,
            round_number: 1,
            stage: "Semi-final".to_string(),
            status: MatchStatus::Completed,
            home_score: Some(home_score),
            away_score: Some(away_score),
            kickoff_at: Utc::now() + Duration::hours(kickoff_offset_hours),
            is_opening_match: false,
        }
    }

    #[test]
    fn test_single_leg_winners_in_bracket_order() {
        let a = knockout_match(1, 10, 20, 2, 0, 0);
        let b = knockout_match(2, 30, 40, 0, 1, 2);
        let winners = pair_winners(&[&b, &a], false).unwrap();
        assert_eq!(winners, vec![10, 40]);
    }

    #[test]
    fn test_single_leg_draw_is_no_winner() {
        let m = knockout_match(1, 10, 20, 1, 1, 0);
        assert!(matches!(
            pair_winners(&[&m], false),
            Err(LifecycleError::NoWinner(1))
        ));
    }

    #[test]
    fn test_two_legged_aggregate() {
        let leg1 = knockout_match(1, 10, 20, 2, 1, 0);
        let leg2 = knockout_match(2, 20, 10, 0, 0, 4);
        let winners = pair_winners(&[&leg1, &leg2], true).unwrap();
        assert_eq!(winners, vec![10]);
    }

    #[test]
    fn test_two_legged_away_goals_break_level_aggregate() {
        // 10 draws 1-1 away, then 2-2 at home: aggregate 3-3, away goals 1-2.
        let leg1 = knockout_match(1, 20, 10, 1, 1, 0);
        let leg2 = knockout_match(2, 10, 20, 2, 2, 4);
        let winners = pair_winners(&[&leg1, &leg2], true).unwrap();
        assert_eq!(winners, vec![20]);
    }

    #[test]
    fn test_automatic_qualifiers_interleave_groups() {
        let registration = |team: TeamId, group: u32| TeamRegistration {
            id: team,
            tournament_id: 1,
            team_id: team,
            status: RegistrationStatus::Approved,
            group_index: Some(group),
            qualified_for_knockout: None,
            registered_at: Utc::now(),
        };
        let registrations = vec![
            registration(1, 0),
            registration(2, 0),
            registration(3, 1),
            registration(4, 1),
        ];
        let group_match = |id, home, away, hs, aws, group| {
            let mut m = knockout_match(id, home, away, hs, aws, id);
            m.group_index = Some(group);
            m.stage = "Group Stage".to_string();
            m
        };
        let matches = vec![
            group_match(1, 1, 2, 3, 0, 0),
            group_match(2, 3, 4, 0, 1, 1),
        ];

        let seeds = automatic_qualifiers(&matches, &registrations, 2).unwrap();
        // Group 0 winner meets group 1 runner-up, and vice versa.
        assert_eq!(seeds, vec![1, 3, 4, 2]);
    }
}
