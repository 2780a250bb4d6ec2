//! Tournament endpoint handlers.

use super::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use matchday::schedule::{GroupAssignment, KnockoutPairing, ManualDraw};
use matchday::tournament::{
    LifecycleError, Match, MatchId, NewTournament, RegistrationStatus, SchedulingMode,
    TeamId, TeamRegistration, Tournament, TournamentId, TournamentMode, TournamentStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// Lifecycle errors mapped onto HTTP statuses: conflicts surface as 409,
/// validation failures as 422, unknown entities as 404.
pub struct ApiError(LifecycleError);

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use LifecycleError::*;
        let status = match &self.0 {
            NotFound(_) | MatchNotOpen(_) | RegistrationNotFound { .. } => StatusCode::NOT_FOUND,
            Busy(_) | AlreadyRegistered { .. } | TournamentFull { .. } | WrongStatus { .. }
            | Transition(_) => StatusCode::CONFLICT,
            NegativeScore | DrawNotAllowed | NoWinner(_) | WrongRound { .. }
            | ManualDrawNotExpected | DrawShapeMismatch | InvalidQualification(_)
            | InvalidReviewDecision(_) | TeamCountOutOfRange { .. } | Schedule(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "lifecycle operation failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTournamentRequest {
    pub name: String,
    pub mode: String,
    pub scheduling_mode: String,
    #[serde(default)]
    pub number_of_groups: u32,
    pub min_teams: u32,
    pub max_teams: u32,
    #[serde(default)]
    pub require_opening_selection: bool,
}

#[derive(Debug, Serialize)]
pub struct TournamentResponse {
    pub id: TournamentId,
    pub name: String,
    pub status: String,
    pub mode: String,
    pub scheduling_mode: String,
    pub number_of_groups: u32,
    pub min_teams: u32,
    pub max_teams: u32,
    pub opening_team_a: Option<TeamId>,
    pub opening_team_b: Option<TeamId>,
    pub winner_team_id: Option<TeamId>,
}

impl From<Tournament> for TournamentResponse {
    fn from(t: Tournament) -> Self {
        Self {
            id: t.id,
            name: t.name,
            status: t.status.as_str().to_string(),
            mode: t.mode.as_str().to_string(),
            scheduling_mode: t.scheduling_mode.as_str().to_string(),
            number_of_groups: t.number_of_groups,
            min_teams: t.min_teams,
            max_teams: t.max_teams,
            opening_team_a: t.opening_team_a,
            opening_team_b: t.opening_team_b,
            winner_team_id: t.winner_team_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub group_index: Option<u32>,
    pub round_number: u32,
    pub stage: String,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub kickoff_at: String,
    pub is_opening_match: bool,
}

impl From<Match> for MatchResponse {
    fn from(m: Match) -> Self {
        Self {
            id: m.id,
            home_team_id: m.home_team_id,
            away_team_id: m.away_team_id,
            group_index: m.group_index,
            round_number: m.round_number,
            stage: m.stage,
            status: m.status.as_str().to_string(),
            home_score: m.home_score,
            away_score: m.away_score,
            kickoff_at: m.kickoff_at.to_rfc3339(),
            is_opening_match: m.is_opening_match,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub team_id: TeamId,
    pub status: String,
    pub group_index: Option<u32>,
    pub qualified_for_knockout: Option<bool>,
}

impl From<TeamRegistration> for RegistrationResponse {
    fn from(r: TeamRegistration) -> Self {
        Self {
            team_id: r.team_id,
            status: r.status.as_str().to_string(),
            group_index: r.group_index,
            qualified_for_knockout: r.qualified_for_knockout,
        }
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": message })),
    )
        .into_response()
}

pub async fn create_tournament(
    State(state): State<AppState>,
    Json(request): Json<CreateTournamentRequest>,
) -> Result<Response, ApiError> {
    let Some(mode) = TournamentMode::parse(&request.mode) else {
        return Ok(bad_request("unknown tournament mode"));
    };
    let Some(scheduling_mode) = SchedulingMode::parse(&request.scheduling_mode) else {
        return Ok(bad_request("unknown scheduling mode"));
    };
    if mode.has_group_stage() && request.number_of_groups == 0 {
        return Ok(bad_request("group modes need number_of_groups >= 1"));
    }
    if request.min_teams < 2 || request.max_teams < request.min_teams {
        return Ok(bad_request("team bounds must satisfy 2 <= min <= max"));
    }

    let tournament = state
        .lifecycle
        .create(NewTournament {
            name: request.name,
            mode,
            scheduling_mode,
            number_of_groups: request.number_of_groups,
            min_teams: request.min_teams,
            max_teams: request.max_teams,
            require_opening_selection: request.require_opening_selection,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TournamentResponse::from(tournament)),
    )
        .into_response())
}

pub async fn get_tournament(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<TournamentResponse>, ApiError> {
    let tournament = state
        .store
        .get(id)
        .await
        .map_err(LifecycleError::from)?
        .ok_or(LifecycleError::NotFound(id))?;
    Ok(Json(tournament.into()))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<Vec<MatchResponse>>, ApiError> {
    let matches = state.store.matches(id).await.map_err(LifecycleError::from)?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<Vec<RegistrationResponse>>, ApiError> {
    let registrations = state
        .store
        .registrations(id)
        .await
        .map_err(LifecycleError::from)?;
    Ok(Json(registrations.into_iter().map(Into::into).collect()))
}

pub async fn open_registration(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(state.lifecycle.open_registration(id).await?))
}

pub async fn close_registration(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(state.lifecycle.close_registration(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RegisterTeamRequest {
    pub team_id: TeamId,
}

pub async fn register_team(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
    Json(request): Json<RegisterTeamRequest>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(
        state.lifecycle.register_team(id, request.team_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRegistrationRequest {
    /// `approved`, `rejected`, or `pending_payment_review`.
    pub decision: String,
}

pub async fn review_registration(
    State(state): State<AppState>,
    Path((id, team_id)): Path<(TournamentId, TeamId)>,
    Json(request): Json<ReviewRegistrationRequest>,
) -> Result<Response, ApiError> {
    let Some(decision) = RegistrationStatus::parse(&request.decision) else {
        return Ok(bad_request("unknown review decision"));
    };
    let outcome = state
        .lifecycle
        .review_registration(id, team_id, decision)
        .await?;
    Ok(Json(outcome).into_response())
}

pub async fn withdraw_team(
    State(state): State<AppState>,
    Path((id, team_id)): Path<(TournamentId, TeamId)>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(state.lifecycle.withdraw_team(id, team_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct OpeningPairRequest {
    pub team_a: TeamId,
    pub team_b: TeamId,
}

pub async fn select_opening_pair(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
    Json(request): Json<OpeningPairRequest>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .select_opening_pair(id, request.team_a, request.team_b)
            .await?,
    ))
}

/// Manual draw payload: exactly one of the two shapes per call.
#[derive(Debug, Deserialize)]
pub struct ManualDrawRequest {
    pub group_assignments: Option<Vec<GroupAssignment>>,
    pub knockout_pairings: Option<Vec<KnockoutPairing>>,
}

pub async fn submit_manual_draw(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
    Json(request): Json<ManualDrawRequest>,
) -> Result<Response, ApiError> {
    let draw = match (request.group_assignments, request.knockout_pairings) {
        (Some(groups), None) => ManualDraw::Groups(groups),
        (None, Some(pairings)) => ManualDraw::Knockout(pairings),
        _ => {
            return Ok(bad_request(
                "provide exactly one of group_assignments or knockout_pairings",
            ));
        }
    };
    let outcome = state.lifecycle.submit_manual_draw(id, draw).await?;
    Ok(Json(outcome).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQualificationRequest {
    pub team_ids: Vec<TeamId>,
}

pub async fn confirm_qualification(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
    Json(request): Json<ConfirmQualificationRequest>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .confirm_qualification(id, request.team_ids)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct MatchResultRequest {
    pub home_score: i32,
    pub away_score: i32,
}

pub async fn record_match_result(
    State(state): State<AppState>,
    Path((id, match_id)): Path<(TournamentId, MatchId)>,
    Json(request): Json<MatchResultRequest>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .record_match_result(id, match_id, request.home_score, request.away_score)
            .await?,
    ))
}

pub async fn check_and_finalize(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(state.lifecycle.check_and_finalize(id).await?))
}

pub async fn cancel_tournament(
    State(state): State<AppState>,
    Path(id): Path<TournamentId>,
) -> Result<Json<matchday::tournament::LifecycleOutcome>, ApiError> {
    Ok(Json(state.lifecycle.cancel(id).await?))
}
