//! `X-Idempotency-Key` middleware.
//!
//! Mutating routes run behind this layer. A request carrying the header is
//! classified by the gateway before the handler runs: fresh keys execute and
//! have their final response stored, identical retries replay that response
//! verbatim, and a reused key with a different body is rejected without
//! executing anything. Requests without the header bypass the gateway
//! entirely.

use super::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use matchday::idempotency::IdempotencyDecision;
use serde_json::json;
use tracing::{debug, error};

/// Client-supplied idempotency key header.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Cap on buffered request/response bodies (these are small JSON payloads).
const MAX_BODY_BYTES: usize = 256 * 1024;

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(key) = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    let route = request.uri().path().to_string();
    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "request body too large" })),
            )
                .into_response();
        }
    };

    let decision = match state.gateway.begin(&key, &route, &body_bytes).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(error = %e, "idempotency gateway unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "idempotency store unavailable" })),
            )
                .into_response();
        }
    };

    match decision {
        IdempotencyDecision::Execute => {
            let request = Request::from_parts(parts, Body::from(body_bytes.clone()));
            let response = next.run(request).await;

            let (response_parts, response_body) = response.into_parts();
            let response_bytes = match axum::body::to_bytes(response_body, MAX_BODY_BYTES).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    let _ = state.gateway.record_failure(&key, &route).await;
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

            let status = response_parts.status;
            if status.is_server_error() {
                // Retryable: an identical retry re-executes.
                if let Err(e) = state.gateway.record_failure(&key, &route).await {
                    error!(error = %e, "failed to record idempotency failure");
                }
            } else {
                let body_text = String::from_utf8_lossy(&response_bytes).into_owned();
                if let Err(e) = state
                    .gateway
                    .record_success(&key, &route, status.as_u16(), &body_text)
                    .await
                {
                    error!(error = %e, "failed to store idempotent response");
                }
            }

            Response::from_parts(response_parts, Body::from(response_bytes))
        }
        IdempotencyDecision::Replay { status_code, body } => {
            debug!(key = %key, route = %route, "replaying stored idempotent response");
            let status =
                StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Response::builder()
                .status(status)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        IdempotencyDecision::InProgressConflict => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "a request with this idempotency key is already in progress"
            })),
        )
            .into_response(),
        IdempotencyDecision::KeyReuseMismatch => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "idempotency key was already used with a different request body"
            })),
        )
            .into_response(),
    }
}
