//! In-memory idempotency store for single-node deployments and tests.

use super::models::{IdempotencyStatus, IdempotentRequest};
use super::store::{IdempotencyResult, IdempotencyStore, InsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Request records held in process memory behind one mutex; the mutex makes
/// insert-if-absent exactly as atomic as the database unique constraint.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    records: Mutex<HashMap<(String, String), IdempotentRequest>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn insert_if_absent(
        &self,
        key: &str,
        route: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<InsertOutcome> {
        let mut records = self.records.lock().await;
        let map_key = (key.to_string(), route.to_string());

        if let Some(existing) = records.get(&map_key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        records.insert(
            map_key,
            IdempotentRequest {
                key: key.to_string(),
                route: route.to_string(),
                request_hash: request_hash.to_string(),
                status: IdempotencyStatus::InProgress,
                status_code: None,
                response_body: None,
                created_at: now,
                completed_at: None,
            },
        );
        Ok(InsertOutcome::Inserted)
    }

    async fn restart_failed(
        &self,
        key: &str,
        route: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&(key.to_string(), route.to_string())) {
            Some(record) if record.status == IdempotencyStatus::Failed => {
                record.status = IdempotencyStatus::InProgress;
                record.created_at = now;
                record.status_code = None;
                record.response_body = None;
                record.completed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        key: &str,
        route: &str,
        status_code: i32,
        response_body: &str,
        now: DateTime<Utc>,
    ) -> IdempotencyResult<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&(key.to_string(), route.to_string())) {
            record.status = IdempotencyStatus::Completed;
            record.status_code = Some(status_code);
            record.response_body = Some(response_body.to_string());
            record.completed_at = Some(now);
        }
        Ok(())
    }

    async fn fail(&self, key: &str, route: &str, now: DateTime<Utc>) -> IdempotencyResult<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&(key.to_string(), route.to_string())) {
            record.status = IdempotencyStatus::Failed;
            record.completed_at = Some(now);
        }
        Ok(())
    }

    async fn get(&self, key: &str, route: &str) -> IdempotencyResult<Option<IdempotentRequest>> {
        let records = self.records.lock().await;
        Ok(records.get(&(key.to_string(), route.to_string())).cloned())
    }
}
