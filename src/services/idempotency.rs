use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::IdempotencyStatus;
use crate::db::queries;
use crate::error::PaymentError;

/// Outcome of attempting to claim an idempotency key.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// Key is ours; proceed with the operation.
    Claimed,
    /// Same key, same request: replay the cached response.
    Completed(serde_json::Value),
    /// Same key, a concurrent request is mid-flight.
    InProgress,
    /// Same key, different request payload. Client error.
    Mismatch,
}

/// Durable idempotency store over Postgres. The claim is an atomic
/// insert-if-absent (unique key + `ON CONFLICT DO NOTHING`), never a
/// read-then-write, so two concurrent requests with the same key cannot
/// both reach the provider. Records expire after a retention window.
#[derive(Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
    retention_hours: i64,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool, retention_hours: i64) -> Self {
        Self {
            pool,
            retention_hours,
        }
    }

    /// Hash of the logically significant request fields. Callers build the
    /// value with a fixed field order so the hash is deterministic.
    pub fn request_hash(fields: &serde_json::Value) -> String {
        let serialized = fields.to_string();
        let digest = Sha256::digest(serialized.as_bytes());
        hex::encode(digest)
    }

    pub async fn claim(
        &self,
        tenant_id: Uuid,
        key: &str,
        request_hash: &str,
    ) -> Result<ClaimOutcome, PaymentError> {
        if queries::claim_idempotency_key(&self.pool, tenant_id, key, request_hash)
            .await?
            .is_some()
        {
            return Ok(ClaimOutcome::Claimed);
        }

        // Lost the insert race or the key already existed; inspect it.
        let existing = queries::get_idempotency_key(&self.pool, tenant_id, key)
            .await?
            .ok_or_else(|| {
                PaymentError::Internal("idempotency key vanished between claim and read".to_string())
            })?;

        if existing.request_hash != request_hash {
            return Ok(ClaimOutcome::Mismatch);
        }

        match existing.status {
            IdempotencyStatus::Processing => Ok(ClaimOutcome::InProgress),
            IdempotencyStatus::Completed => {
                let response = existing.response.ok_or_else(|| {
                    PaymentError::Internal(
                        "completed idempotency record has no cached response".to_string(),
                    )
                })?;
                Ok(ClaimOutcome::Completed(response))
            }
        }
    }

    pub async fn complete(
        &self,
        tenant_id: Uuid,
        key: &str,
        response: &serde_json::Value,
    ) -> Result<(), PaymentError> {
        queries::complete_idempotency_key(&self.pool, tenant_id, key, response).await?;
        Ok(())
    }

    /// Releases a claimed key after a failed operation so the client can
    /// retry with the same key.
    pub async fn release(&self, tenant_id: Uuid, key: &str) -> Result<(), PaymentError> {
        queries::delete_idempotency_key(&self.pool, tenant_id, key).await?;
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, PaymentError> {
        let cutoff = Utc::now() - Duration::hours(self.retention_hours);
        let purged = queries::purge_idempotency_keys(&self.pool, cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired idempotency records");
        }
        Ok(purged)
    }
}
