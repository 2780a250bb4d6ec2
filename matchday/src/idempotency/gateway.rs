//! Gateway decision logic.

use super::models::{IdempotencyStatus, request_hash};
use super::store::{IdempotencyResult, IdempotencyStore, InsertOutcome};
use chrono::Utc;
use log::debug;
use std::sync::Arc;

/// What the caller should do with the incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyDecision {
    /// First sighting (or a reclaimed failure): execute the request and
    /// record the outcome.
    Execute,
    /// Identical request already completed: replay the stored response
    /// verbatim, with no side effects.
    Replay { status_code: u16, body: String },
    /// An identical request is currently executing elsewhere.
    InProgressConflict,
    /// Same key, different body. The request must never be executed.
    KeyReuseMismatch,
}

/// Request-level replay cache over an [`IdempotencyStore`].
#[derive(Clone)]
pub struct IdempotencyGateway {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyGateway {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    /// Classify an incoming keyed request.
    pub async fn begin(
        &self,
        key: &str,
        route: &str,
        body: &[u8],
    ) -> IdempotencyResult<IdempotencyDecision> {
        let hash = request_hash(body);
        let now = Utc::now();

        match self.store.insert_if_absent(key, route, &hash, now).await? {
            InsertOutcome::Inserted => Ok(IdempotencyDecision::Execute),
            InsertOutcome::Existing(existing) => {
                if existing.request_hash != hash {
                    debug!("idempotency key `{key}` reused with a different body on {route}");
                    return Ok(IdempotencyDecision::KeyReuseMismatch);
                }
                match existing.status {
                    IdempotencyStatus::InProgress => Ok(IdempotencyDecision::InProgressConflict),
                    IdempotencyStatus::Completed => Ok(IdempotencyDecision::Replay {
                        status_code: existing.status_code.unwrap_or(200) as u16,
                        body: existing.response_body.unwrap_or_default(),
                    }),
                    IdempotencyStatus::Failed => {
                        // An identical retry of a failed request may run again;
                        // losing the flip means another retry got there first.
                        if self.store.restart_failed(key, route, now).await? {
                            Ok(IdempotencyDecision::Execute)
                        } else {
                            Ok(IdempotencyDecision::InProgressConflict)
                        }
                    }
                }
            }
        }
    }

    /// Persist the final response so later retries replay it.
    pub async fn record_success(
        &self,
        key: &str,
        route: &str,
        status_code: u16,
        body: &str,
    ) -> IdempotencyResult<()> {
        self.store
            .complete(key, route, i32::from(status_code), body, Utc::now())
            .await
    }

    /// Mark the attempt failed; an identical retry re-executes.
    pub async fn record_failure(&self, key: &str, route: &str) -> IdempotencyResult<()> {
        self.store.fail(key, route, Utc::now()).await
    }
}
