//! HTTP API for the tournament server.
//!
//! Thin handlers over the `matchday` lifecycle service. Everything mutating
//! sits behind the `X-Idempotency-Key` middleware; requests without the
//! header bypass the replay cache entirely.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                                          - health check
//! POST /api/v1/tournaments                              - create tournament
//! GET  /api/v1/tournaments/{id}                         - tournament details
//! GET  /api/v1/tournaments/{id}/matches                 - match list
//! GET  /api/v1/tournaments/{id}/registrations           - registration list
//! POST /api/v1/tournaments/{id}/registration/open       - open registration
//! POST /api/v1/tournaments/{id}/registration/close      - close registration
//! POST /api/v1/tournaments/{id}/teams                   - register a team
//! POST /api/v1/tournaments/{id}/teams/{team}/review     - approve/reject
//! POST /api/v1/tournaments/{id}/teams/{team}/withdraw   - withdraw
//! POST /api/v1/tournaments/{id}/opening-pair            - pick opening match
//! POST /api/v1/tournaments/{id}/draw                    - submit manual draw
//! POST /api/v1/tournaments/{id}/qualification           - confirm qualifiers
//! POST /api/v1/tournaments/{id}/matches/{match}/result  - record result
//! POST /api/v1/tournaments/{id}/check                   - run the decision sweep
//! POST /api/v1/tournaments/{id}/cancel                  - cancel tournament
//! ```

pub mod idempotency;
pub mod tournaments;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use matchday::idempotency::IdempotencyGateway;
use matchday::tournament::{TournamentLifecycle, TournamentStore};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<TournamentLifecycle>,
    pub store: Arc<dyn TournamentStore>,
    pub gateway: IdempotencyGateway,
}

/// Build the complete router.
pub fn create_router(state: AppState) -> Router {
    let mutating = Router::new()
        .route("/tournaments", post(tournaments::create_tournament))
        .route(
            "/tournaments/{id}/registration/open",
            post(tournaments::open_registration),
        )
        .route(
            "/tournaments/{id}/registration/close",
            post(tournaments::close_registration),
        )
        .route("/tournaments/{id}/teams", post(tournaments::register_team))
        .route(
            "/tournaments/{id}/teams/{team_id}/review",
            post(tournaments::review_registration),
        )
        .route(
            "/tournaments/{id}/teams/{team_id}/withdraw",
            post(tournaments::withdraw_team),
        )
        .route(
            "/tournaments/{id}/opening-pair",
            post(tournaments::select_opening_pair),
        )
        .route("/tournaments/{id}/draw", post(tournaments::submit_manual_draw))
        .route(
            "/tournaments/{id}/qualification",
            post(tournaments::confirm_qualification),
        )
        .route(
            "/tournaments/{id}/matches/{match_id}/result",
            post(tournaments::record_match_result),
        )
        .route("/tournaments/{id}/check", post(tournaments::check_and_finalize))
        .route("/tournaments/{id}/cancel", post(tournaments::cancel_tournament))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            idempotency::idempotency_middleware,
        ));

    let read_only = Router::new()
        .route("/tournaments/{id}", get(tournaments::get_tournament))
        .route("/tournaments/{id}/matches", get(tournaments::list_matches))
        .route(
            "/tournaments/{id}/registrations",
            get(tournaments::list_registrations),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", mutating.merge(read_only))
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Record request counters for every route.
async fn track_metrics(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    crate::metrics::http_requests_total(&method, &path, response.status().as_u16());
    response
}

/// Health check for load balancers: verifies the store answers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.active_tournament_ids().await {
        Ok(active) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "active_tournaments": active.len(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            })),
        ),
    }
}
