//! Idempotent request records.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Lifecycle of one keyed request. `(key, route)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::InProgress => "in_progress",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(IdempotencyStatus::InProgress),
            "completed" => Some(IdempotencyStatus::Completed),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

/// A stored request record; completed rows carry the response to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotentRequest {
    pub key: String,
    pub route: String,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// SHA-256 content hash of a request body, hex-encoded.
pub fn request_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_hash_is_stable() {
        assert_eq!(request_hash(b"abc"), request_hash(b"abc"));
        assert_ne!(request_hash(b"abc"), request_hash(b"abd"));
        assert_eq!(request_hash(b"").len(), 64);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            IdempotencyStatus::InProgress,
            IdempotencyStatus::Completed,
            IdempotencyStatus::Failed,
        ] {
            assert_eq!(IdempotencyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IdempotencyStatus::parse("nope"), None);
    }
}
