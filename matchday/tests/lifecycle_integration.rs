//! Integration tests for the tournament lifecycle state machine.
//!
//! These drive the real lifecycle service against the in-memory store, lock
//! backend, and outbox, covering registration, generation, progression,
//! manual flows, and finalization.

use matchday::lock::{LockManager, MemoryLockBackend};
use matchday::outbox::MemoryOutboxStore;
use matchday::schedule::{GroupAssignment, KnockoutPairing, ManualDraw};
use matchday::tournament::{
    CompletedMatch, LifecycleError, LifecycleSweeper, MatchStatus, MemoryTournamentStore,
    NewTournament, RegistrationStatus, SaveChanges, SchedulingMode, TeamId, TournamentId,
    TournamentLifecycle, TournamentMode, TournamentStatus, TournamentStore,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    lifecycle: Arc<TournamentLifecycle>,
    store: Arc<MemoryTournamentStore>,
    outbox: Arc<MemoryOutboxStore>,
    locks: Arc<LockManager>,
}

fn harness() -> Harness {
    let outbox = Arc::new(MemoryOutboxStore::new());
    let store = Arc::new(MemoryTournamentStore::new(outbox.clone()));
    let locks = Arc::new(LockManager::new(Arc::new(MemoryLockBackend::new())));
    let lifecycle = Arc::new(TournamentLifecycle::new(store.clone(), locks.clone()));
    Harness {
        lifecycle,
        store,
        outbox,
        locks,
    }
}

fn new_tournament(
    mode: TournamentMode,
    scheduling_mode: SchedulingMode,
    number_of_groups: u32,
) -> NewTournament {
    NewTournament {
        name: "Spring Invitational".to_string(),
        mode,
        scheduling_mode,
        number_of_groups,
        min_teams: 2,
        max_teams: 32,
        require_opening_selection: false,
    }
}

/// Create a tournament, open registration, and approve `teams`.
async fn registered(harness: &Harness, new: NewTournament, teams: &[TeamId]) -> TournamentId {
    let tournament = harness.lifecycle.create(new).await.unwrap();
    let id = tournament.id;
    harness.lifecycle.open_registration(id).await.unwrap();
    for team in teams {
        harness.lifecycle.register_team(id, *team).await.unwrap();
        harness
            .lifecycle
            .review_registration(id, *team, RegistrationStatus::Approved)
            .await
            .unwrap();
    }
    id
}

/// Record `home wins 1-0` for every open match, returning how many results
/// were recorded.
async fn finish_open_matches(harness: &Harness, id: TournamentId) -> usize {
    let mut recorded = 0;
    loop {
        let open: Vec<_> = harness
            .store
            .matches(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.status == MatchStatus::Scheduled)
            .collect();
        if open.is_empty() {
            return recorded;
        }
        for m in open {
            harness
                .lifecycle
                .record_match_result(id, m.id, 1, 0)
                .await
                .unwrap();
            recorded += 1;
        }
    }
}

#[tokio::test]
async fn test_league_runs_to_completion() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0),
        &[1, 2, 3, 4],
    )
    .await;

    let outcome = h.lifecycle.close_registration(id).await.unwrap();
    assert_eq!(outcome.status, TournamentStatus::Active);
    assert!(outcome.next_round_generated);
    assert_eq!(outcome.generated_match_count, 6);

    let matches = h.store.matches(id).await.unwrap();
    assert_eq!(matches.len(), 6);

    // Home always wins; the league table decides the champion
    // deterministically, and the last result finalizes the tournament.
    let mut last_outcome = None;
    for m in matches {
        last_outcome = Some(
            h.lifecycle
                .record_match_result(id, m.id, 1, 0)
                .await
                .unwrap(),
        );
    }
    let last_outcome = last_outcome.unwrap();
    assert!(last_outcome.tournament_finalized);
    assert!(last_outcome.winner_team_id.is_some());

    let tournament = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert_eq!(tournament.winner_team_id, last_outcome.winner_team_id);
}

#[tokio::test]
async fn test_knockout_rounds_are_gated_on_prior_round() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::Knockout, SchedulingMode::Automatic, 0),
        &[1, 2, 3, 4],
    )
    .await;

    let outcome = h.lifecycle.close_registration(id).await.unwrap();
    assert!(outcome.next_round_generated);
    let semis = h.store.matches(id).await.unwrap();
    assert_eq!(semis.len(), 2);
    assert!(semis.iter().all(|m| m.round_number == 1));
    assert!(semis.iter().all(|m| m.stage == "Semi-final"));

    // One semi-final done: no new round may appear.
    let outcome = h
        .lifecycle
        .record_match_result(id, semis[0].id, 2, 1)
        .await
        .unwrap();
    assert!(!outcome.next_round_generated);
    assert_eq!(h.store.matches(id).await.unwrap().len(), 2);

    // A sweep in between sees nothing to do either.
    let outcome = h.lifecycle.check_and_finalize(id).await.unwrap();
    assert!(!outcome.is_actionable());

    // Second semi-final completes the round; the final is generated.
    let outcome = h
        .lifecycle
        .record_match_result(id, semis[1].id, 0, 3)
        .await
        .unwrap();
    assert!(outcome.next_round_generated);
    assert_eq!(outcome.generated_round, Some(2));

    let matches = h.store.matches(id).await.unwrap();
    let final_match = matches
        .iter()
        .find(|m| m.round_number == 2)
        .expect("final generated");
    assert_eq!(final_match.stage, "Final");
    assert_eq!(final_match.home_team_id, semis[0].home_team_id);
    assert_eq!(final_match.away_team_id, semis[1].away_team_id);

    // The final decides the tournament.
    let outcome = h
        .lifecycle
        .record_match_result(id, final_match.id, 1, 0)
        .await
        .unwrap();
    assert!(outcome.tournament_finalized);
    assert_eq!(outcome.winner_team_id, Some(final_match.home_team_id));

    let tournament = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert_eq!(tournament.winner_team_id, Some(final_match.home_team_id));
}

#[tokio::test]
async fn test_groups_then_knockout_automatic_qualification() {
    let h = harness();
    let teams: Vec<TeamId> = (1..=8).collect();
    let id = registered(
        &h,
        new_tournament(TournamentMode::GroupsThenKnockout, SchedulingMode::Automatic, 2),
        &teams,
    )
    .await;

    let outcome = h.lifecycle.close_registration(id).await.unwrap();
    assert!(outcome.next_round_generated);
    // Two groups of four, single round robin: 6 matches each.
    assert_eq!(outcome.generated_match_count, 12);

    let registrations = h.store.registrations(id).await.unwrap();
    assert!(registrations.iter().all(|r| r.group_index.is_some()));

    // Play out the group stage; the last result settles qualification and
    // seeds the knockout bracket.
    let group_matches = h.store.matches(id).await.unwrap();
    let mut last_outcome = None;
    for m in &group_matches {
        last_outcome = Some(
            h.lifecycle
                .record_match_result(id, m.id, 2, 0)
                .await
                .unwrap(),
        );
    }
    let last_outcome = last_outcome.unwrap();
    assert!(last_outcome.groups_finished);
    assert!(last_outcome.next_round_generated);
    assert_eq!(last_outcome.generated_round, Some(1));
    assert_eq!(last_outcome.status, TournamentStatus::Active);

    let registrations = h.store.registrations(id).await.unwrap();
    let qualified: Vec<TeamId> = registrations
        .iter()
        .filter(|r| r.qualified_for_knockout == Some(true))
        .map(|r| r.team_id)
        .collect();
    assert_eq!(qualified.len(), 4);
    assert!(
        registrations
            .iter()
            .all(|r| r.qualified_for_knockout.is_some())
    );

    let semis: Vec<_> = h
        .store
        .matches(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.group_index.is_none() && m.status == MatchStatus::Scheduled)
        .collect();
    assert_eq!(semis.len(), 2);
    for m in &semis {
        assert!(qualified.contains(&m.home_team_id));
        assert!(qualified.contains(&m.away_team_id));
    }

    // Knockout runs to the champion.
    finish_open_matches(&h, id).await;
    let tournament = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert!(tournament.winner_team_id.is_some());
    assert!(qualified.contains(&tournament.winner_team_id.unwrap()));
}

#[tokio::test]
async fn test_manual_flow_draws_qualification_and_replacement() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::GroupsThenKnockout, SchedulingMode::Manual, 2),
        &[1, 2, 3, 4],
    )
    .await;

    // Manual scheduling stops at RegistrationClosed and asks for a draw.
    let outcome = h.lifecycle.close_registration(id).await.unwrap();
    assert_eq!(outcome.status, TournamentStatus::RegistrationClosed);
    assert!(outcome.manual_draw_required);
    assert!(h.store.matches(id).await.unwrap().is_empty());

    // A bad draw (missing team) is rejected without touching state.
    let bad = ManualDraw::Groups(vec![
        GroupAssignment {
            group_index: 0,
            team_ids: vec![1, 2],
        },
        GroupAssignment {
            group_index: 1,
            team_ids: vec![3, 3],
        },
    ]);
    assert!(h.lifecycle.submit_manual_draw(id, bad).await.is_err());
    assert!(h.store.matches(id).await.unwrap().is_empty());
    assert_eq!(
        h.store.get(id).await.unwrap().unwrap().status,
        TournamentStatus::RegistrationClosed
    );

    let draw = ManualDraw::Groups(vec![
        GroupAssignment {
            group_index: 0,
            team_ids: vec![1, 2],
        },
        GroupAssignment {
            group_index: 1,
            team_ids: vec![3, 4],
        },
    ]);
    let outcome = h.lifecycle.submit_manual_draw(id, draw).await.unwrap();
    assert_eq!(outcome.status, TournamentStatus::Active);
    assert!(outcome.next_round_generated);
    assert_eq!(outcome.generated_match_count, 2);

    // Finish the two group matches: the organiser must now pick qualifiers.
    let group_matches = h.store.matches(id).await.unwrap();
    let mut last_outcome = None;
    for m in &group_matches {
        last_outcome = Some(
            h.lifecycle
                .record_match_result(id, m.id, 1, 0)
                .await
                .unwrap(),
        );
    }
    let last_outcome = last_outcome.unwrap();
    assert!(last_outcome.groups_finished);
    assert!(last_outcome.manual_qualification_required);
    assert_eq!(last_outcome.status, TournamentStatus::ManualQualificationPending);

    // Group winners advance (home teams won).
    let outcome = h
        .lifecycle
        .confirm_qualification(id, vec![1, 3])
        .await
        .unwrap();
    assert!(outcome.next_round_generated);
    assert_eq!(outcome.status, TournamentStatus::Active);

    let auto_final: Vec<_> = h
        .store
        .matches(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.group_index.is_none() && m.status == MatchStatus::Scheduled)
        .collect();
    assert_eq!(auto_final.len(), 1);
    assert_eq!(auto_final[0].stage, "Final");

    // The organiser replaces the auto-seeded round with their own pairing
    // (home advantage flipped). The scheduled match is cancelled, not erred.
    let replacement = ManualDraw::Knockout(vec![KnockoutPairing {
        home_team_id: 3,
        away_team_id: 1,
        round_number: 1,
        stage_name: "Final".to_string(),
    }]);
    let outcome = h
        .lifecycle
        .submit_manual_draw(id, replacement)
        .await
        .unwrap();
    assert!(outcome.next_round_generated);

    let matches = h.store.matches(id).await.unwrap();
    let cancelled: Vec<_> = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Cancelled)
        .collect();
    assert_eq!(cancelled.len(), 1);
    let live_final: Vec<_> = matches
        .iter()
        .filter(|m| m.group_index.is_none() && m.status == MatchStatus::Scheduled)
        .collect();
    assert_eq!(live_final.len(), 1);
    assert_eq!(live_final[0].home_team_id, 3);
    assert_eq!(live_final[0].away_team_id, 1);

    let outcome = h
        .lifecycle
        .record_match_result(id, live_final[0].id, 2, 0)
        .await
        .unwrap();
    assert!(outcome.tournament_finalized);
    assert_eq!(outcome.winner_team_id, Some(3));
}

#[tokio::test]
async fn test_opening_selection_gates_generation() {
    let h = harness();
    let mut new = new_tournament(TournamentMode::Knockout, SchedulingMode::Automatic, 0);
    new.require_opening_selection = true;
    let id = registered(&h, new, &[1, 2, 3, 4]).await;

    let outcome = h.lifecycle.close_registration(id).await.unwrap();
    assert_eq!(
        outcome.status,
        TournamentStatus::WaitingForOpeningMatchSelection
    );
    assert!(!outcome.next_round_generated);
    assert!(h.store.matches(id).await.unwrap().is_empty());

    let outcome = h.lifecycle.select_opening_pair(id, 1, 3).await.unwrap();
    assert_eq!(outcome.status, TournamentStatus::Active);
    assert!(outcome.next_round_generated);

    let matches = h.store.matches(id).await.unwrap();
    assert_eq!(matches.len(), 2);
    let opening: Vec<_> = matches.iter().filter(|m| m.is_opening_match).collect();
    assert_eq!(opening.len(), 1);
    assert!(opening[0].involves(1) && opening[0].involves(3));
    let earliest = matches.iter().map(|m| m.kickoff_at).min().unwrap();
    assert_eq!(opening[0].kickoff_at, earliest);
}

#[tokio::test]
async fn test_registration_guards() {
    let h = harness();
    let mut new = new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0);
    new.min_teams = 4;
    new.max_teams = 4;
    let tournament = h.lifecycle.create(new).await.unwrap();
    let id = tournament.id;
    h.lifecycle.open_registration(id).await.unwrap();

    h.lifecycle.register_team(id, 1).await.unwrap();
    let err = h.lifecycle.register_team(id, 1).await.unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRegistered { .. }));

    for team in [2, 3, 4] {
        h.lifecycle.register_team(id, team).await.unwrap();
    }
    let err = h.lifecycle.register_team(id, 5).await.unwrap_err();
    assert!(matches!(err, LifecycleError::TournamentFull { .. }));

    // A withdrawn team frees its slot and may come back.
    h.lifecycle.withdraw_team(id, 4).await.unwrap();
    h.lifecycle.register_team(id, 5).await.unwrap();

    // Approve only three of four: closing fails the count check.
    for team in [1, 2, 3] {
        h.lifecycle
            .review_registration(id, team, RegistrationStatus::Approved)
            .await
            .unwrap();
    }
    let err = h.lifecycle.close_registration(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::TeamCountOutOfRange { got: 3, .. }));

    h.lifecycle
        .review_registration(id, 5, RegistrationStatus::Approved)
        .await
        .unwrap();
    h.lifecycle.close_registration(id).await.unwrap();
}

#[tokio::test]
async fn test_knockout_draws_rejected() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::Knockout, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;
    h.lifecycle.close_registration(id).await.unwrap();

    let matches = h.store.matches(id).await.unwrap();
    let err = h
        .lifecycle
        .record_match_result(id, matches[0].id, 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::DrawNotAllowed));

    let err = h
        .lifecycle
        .record_match_result(id, matches[0].id, -1, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NegativeScore));

    // The match is still open after the rejections.
    let m = h.store.get_match(matches[0].id).await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Scheduled);
}

#[tokio::test]
async fn test_busy_tournament_fails_fast() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;

    let guard = h.locks.acquire_tournament(id).await.expect("free lock");
    let err = h.lifecycle.close_registration(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Busy(_)));

    guard.release().await;
    h.lifecycle.close_registration(id).await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_writes_events_through_the_outbox() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;
    h.lifecycle.close_registration(id).await.unwrap();
    finish_open_matches(&h, id).await;

    let rows = h.outbox.snapshot().await;
    let types: Vec<&str> = rows.iter().map(|m| m.event_type.as_str()).collect();
    assert!(types.contains(&"tournament.status_changed"));
    assert!(types.contains(&"tournament.team_registered"));
    assert!(types.contains(&"tournament.matches_generated"));
    assert!(types.contains(&"match.completed"));
    assert!(types.contains(&"tournament.finalized"));

    // Saving again without new events must not re-emit (drained on save).
    let before = rows.len();
    let outcome = h.lifecycle.check_and_finalize(id).await.unwrap();
    assert!(!outcome.is_actionable());
    assert_eq!(h.outbox.snapshot().await.len(), before);
}

#[tokio::test]
async fn test_cancel_from_any_live_status_and_terminal_guard() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;

    let outcome = h.lifecycle.cancel(id).await.unwrap();
    assert_eq!(outcome.status, TournamentStatus::Cancelled);

    let err = h.lifecycle.cancel(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Transition(_)));

    let err = h.lifecycle.close_registration(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::WrongStatus { .. }));
}

#[tokio::test]
async fn test_sweep_picks_up_missed_decisions() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::League, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;
    h.lifecycle.close_registration(id).await.unwrap();

    // Record the result through the store alone, simulating a process that
    // crashed after committing the score but before running the decision.
    let matches = h.store.matches(id).await.unwrap();
    let mut tournament = h.store.get(id).await.unwrap().unwrap();
    h.store
        .save(
            &mut tournament,
            SaveChanges {
                completed_match: Some(CompletedMatch {
                    match_id: matches[0].id,
                    home_score: 2,
                    away_score: 1,
                }),
                ..SaveChanges::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.store.get(id).await.unwrap().unwrap().status,
        TournamentStatus::Active
    );

    // The periodic sweep finds the finished league and finalizes it.
    let sweeper = LifecycleSweeper::new(
        h.lifecycle.clone(),
        h.store.clone(),
        Duration::from_secs(60),
    );
    assert_eq!(sweeper.sweep_once().await, 1);

    let tournament = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert_eq!(tournament.winner_team_id, Some(matches[0].home_team_id));
}

#[tokio::test]
async fn test_two_legged_knockout_aggregates() {
    let h = harness();
    let id = registered(
        &h,
        new_tournament(TournamentMode::KnockoutTwoLegged, SchedulingMode::Automatic, 0),
        &[1, 2],
    )
    .await;
    h.lifecycle.close_registration(id).await.unwrap();

    let legs = h.store.matches(id).await.unwrap();
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].round_number, 1);

    // First leg may end level.
    h.lifecycle
        .record_match_result(id, legs[0].id, 1, 1)
        .await
        .unwrap();

    // A second leg that leaves aggregate and away goals level is rejected.
    let err = h
        .lifecycle
        .record_match_result(id, legs[1].id, 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::DrawNotAllowed));

    // A decisive second leg settles the tie and the tournament.
    let outcome = h
        .lifecycle
        .record_match_result(id, legs[1].id, 2, 0)
        .await
        .unwrap();
    assert!(outcome.tournament_finalized);
    assert_eq!(outcome.winner_team_id, Some(legs[1].home_team_id));
}
