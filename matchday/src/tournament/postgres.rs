//! Postgres tournament store.

use super::models::{
    Match, MatchId, MatchStatus, RegistrationStatus, SchedulingMode, TeamRegistration, Tournament,
    TournamentId, TournamentMode, TournamentStatus,
};
use super::store::{NewTournament, SaveChanges, StoreError, StoreResult, TournamentStore};
use crate::outbox::{NewOutboxMessage, PgOutboxStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Tournament entities persisted across the `tournaments`,
/// `team_registrations` and `matches` tables, with the outbox drain sharing
/// the save transaction.
pub struct PgTournamentStore {
    pool: Arc<PgPool>,
}

impl PgTournamentStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn row_to_tournament(row: &sqlx::postgres::PgRow) -> Tournament {
        let status_str: String = row.get("status");
        let mode_str: String = row.get("mode");
        let scheduling_str: String = row.get("scheduling_mode");
        Tournament::from_parts(
            row.get("id"),
            row.get("name"),
            TournamentStatus::parse(&status_str).unwrap_or(TournamentStatus::Cancelled),
            TournamentMode::parse(&mode_str).unwrap_or(TournamentMode::League),
            SchedulingMode::parse(&scheduling_str).unwrap_or(SchedulingMode::Automatic),
            row.get::<i32, _>("number_of_groups") as u32,
            row.get::<i32, _>("min_teams") as u32,
            row.get::<i32, _>("max_teams") as u32,
            row.get("opening_team_a"),
            row.get("opening_team_b"),
            row.get("require_opening_selection"),
            row.get("winner_team_id"),
            row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
            row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
        )
    }

    fn row_to_registration(row: &sqlx::postgres::PgRow) -> TeamRegistration {
        let status_str: String = row.get("status");
        TeamRegistration {
            id: row.get("id"),
            tournament_id: row.get("tournament_id"),
            team_id: row.get("team_id"),
            status: RegistrationStatus::parse(&status_str).unwrap_or(RegistrationStatus::Rejected),
            group_index: row.get::<Option<i32>, _>("group_index").map(|g| g as u32),
            qualified_for_knockout: row.get("qualified_for_knockout"),
            registered_at: row
                .get::<chrono::NaiveDateTime, _>("registered_at")
                .and_utc(),
        }
    }

    fn row_to_match(row: &sqlx::postgres::PgRow) -> Match {
        let status_str: String = row.get("status");
        Match {
            id: row.get("id"),
            tournament_id: row.get("tournament_id"),
            home_team_id: row.get("home_team_id"),
            away_team_id: row.get("away_team_id"),
            group_index: row.get::<Option<i32>, _>("group_index").map(|g| g as u32),
            round_number: row.get::<i32, _>("round_number") as u32,
            stage: row.get("stage"),
            status: MatchStatus::parse(&status_str).unwrap_or(MatchStatus::Cancelled),
            home_score: row.get("home_score"),
            away_score: row.get("away_score"),
            kickoff_at: row.get::<chrono::NaiveDateTime, _>("kickoff_at").and_utc(),
            is_opening_match: row.get("is_opening_match"),
        }
    }

    fn is_unique_violation(error: &sqlx::Error) -> bool {
        matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}

#[async_trait]
impl TournamentStore for PgTournamentStore {
    async fn create(&self, new: NewTournament) -> StoreResult<Tournament> {
        let row = sqlx::query(
            r#"
            INSERT INTO tournaments
                (name, status, mode, scheduling_mode, number_of_groups,
                 min_teams, max_teams, require_opening_selection)
            VALUES ($1, 'draft', $2, $3, $4, $5, $6, $7)
            RETURNING id, name, status, mode, scheduling_mode, number_of_groups,
                      min_teams, max_teams, opening_team_a, opening_team_b,
                      require_opening_selection, winner_team_id, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(new.mode.as_str())
        .bind(new.scheduling_mode.as_str())
        .bind(new.number_of_groups as i32)
        .bind(new.min_teams as i32)
        .bind(new.max_teams as i32)
        .bind(new.require_opening_selection)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Self::row_to_tournament(&row))
    }

    async fn get(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, status, mode, scheduling_mode, number_of_groups,
                   min_teams, max_teams, opening_team_a, opening_team_b,
                   require_opening_selection, winner_team_id, created_at, updated_at
            FROM tournaments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(Self::row_to_tournament))
    }

    async fn registrations(&self, id: TournamentId) -> StoreResult<Vec<TeamRegistration>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, team_id, status, group_index,
                   qualified_for_knockout, registered_at
            FROM team_registrations
            WHERE tournament_id = $1
            ORDER BY registered_at, id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(Self::row_to_registration).collect())
    }

    async fn matches(&self, id: TournamentId) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, home_team_id, away_team_id, group_index,
                   round_number, stage, status, home_score, away_score,
                   kickoff_at, is_opening_match
            FROM matches
            WHERE tournament_id = $1
            ORDER BY kickoff_at, id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(Self::row_to_match).collect())
    }

    async fn get_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT id, tournament_id, home_team_id, away_team_id, group_index,
                   round_number, stage, status, home_score, away_score,
                   kickoff_at, is_opening_match
            FROM matches
            WHERE id = $1
            "#,
        )
        .bind(match_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.as_ref().map(Self::row_to_match))
    }

    async fn active_tournament_ids(&self) -> StoreResult<Vec<TournamentId>> {
        let rows = sqlx::query("SELECT id FROM tournaments WHERE status = 'active' ORDER BY id")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn save(&self, tournament: &mut Tournament, changes: SaveChanges) -> StoreResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE tournaments
            SET status = $2, opening_team_a = $3, opening_team_b = $4,
                winner_team_id = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(tournament.id)
        .bind(tournament.status.as_str())
        .bind(tournament.opening_team_a)
        .bind(tournament.opening_team_b)
        .bind(tournament.winner_team_id)
        .bind(now.naive_utc())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::TournamentNotFound(tournament.id));
        }

        if let Some(completed) = &changes.completed_match {
            let result = sqlx::query(
                r#"
                UPDATE matches
                SET status = 'completed', home_score = $2, away_score = $3
                WHERE id = $1
                "#,
            )
            .bind(completed.match_id)
            .bind(completed.home_score)
            .bind(completed.away_score)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::MatchNotFound(completed.match_id));
            }
        }

        if let Some(round) = changes.cancel_scheduled_in_round {
            sqlx::query(
                r#"
                UPDATE matches SET status = 'cancelled'
                WHERE tournament_id = $1 AND round_number = $2
                  AND group_index IS NULL AND status = 'scheduled'
                "#,
            )
            .bind(tournament.id)
            .bind(round as i32)
            .execute(&mut *tx)
            .await?;
        }

        for team_id in &changes.new_registrations {
            let result = sqlx::query(
                r#"
                INSERT INTO team_registrations (tournament_id, team_id, status, registered_at)
                VALUES ($1, $2, 'pending', $3)
                "#,
            )
            .bind(tournament.id)
            .bind(*team_id)
            .bind(now.naive_utc())
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                if Self::is_unique_violation(&e) {
                    return Err(StoreError::DuplicateRegistration {
                        tournament_id: tournament.id,
                        team_id: *team_id,
                    });
                }
                return Err(e.into());
            }
        }

        for update in &changes.registration_updates {
            sqlx::query(
                r#"
                UPDATE team_registrations
                SET status = COALESCE($3, status),
                    group_index = COALESCE($4, group_index),
                    qualified_for_knockout = COALESCE($5, qualified_for_knockout)
                WHERE tournament_id = $1 AND team_id = $2
                "#,
            )
            .bind(tournament.id)
            .bind(update.team_id)
            .bind(update.status.map(RegistrationStatus::as_str))
            .bind(update.group_index.map(|g| g as i32))
            .bind(update.qualified_for_knockout)
            .execute(&mut *tx)
            .await?;
        }

        for planned in &changes.new_matches {
            sqlx::query(
                r#"
                INSERT INTO matches
                    (tournament_id, home_team_id, away_team_id, group_index,
                     round_number, stage, status, kickoff_at, is_opening_match)
                VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $8)
                "#,
            )
            .bind(tournament.id)
            .bind(planned.home_team_id)
            .bind(planned.away_team_id)
            .bind(planned.group_index.map(|g| g as i32))
            .bind(planned.round_number as i32)
            .bind(&planned.stage)
            .bind(planned.kickoff_at.naive_utc())
            .bind(planned.is_opening_match)
            .execute(&mut *tx)
            .await?;
        }

        // Drain the aggregate's events into the outbox inside the same
        // transaction; clear them from the entity only after the commit.
        let events = tournament.pending_events().to_vec();
        if !events.is_empty() {
            let mut rows = Vec::with_capacity(events.len());
            for event in &events {
                rows.push(NewOutboxMessage::from_event(event, now)?);
            }
            PgOutboxStore::append_in_tx(&mut tx, &rows).await?;
        }

        tx.commit().await?;
        tournament.take_pending_events();
        tournament.updated_at = now;
        Ok(())
    }
}
