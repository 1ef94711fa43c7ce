use sqlx::{Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

pub const ENTITY_TRANSACTION: &str = "transaction";
pub const ENTITY_REFUND: &str = "refund";
pub const ENTITY_FEE_SPLIT: &str = "fee_split";

pub struct AuditLog;

impl AuditLog {
    /// Records an entity creation in the same database transaction as the
    /// write it describes, so the audit row is never visible without it.
    pub async fn log_creation(
        executor: &mut SqlxTransaction<'_, Postgres>,
        entity_id: Uuid,
        entity_type: &str,
        detail: serde_json::Value,
        actor: &str,
    ) -> Result<()> {
        Self::log(executor, entity_id, entity_type, "created", detail, actor).await
    }

    pub async fn log_status_change(
        executor: &mut SqlxTransaction<'_, Postgres>,
        entity_id: Uuid,
        entity_type: &str,
        detail: serde_json::Value,
        actor: &str,
    ) -> Result<()> {
        Self::log(
            executor,
            entity_id,
            entity_type,
            "status_changed",
            detail,
            actor,
        )
        .await
    }

    /// Fee-split adjustments log the before/after deltas so the adjustment
    /// history survives the in-place update.
    pub async fn log_adjustment(
        executor: &mut SqlxTransaction<'_, Postgres>,
        entity_id: Uuid,
        entity_type: &str,
        detail: serde_json::Value,
        actor: &str,
    ) -> Result<()> {
        Self::log(executor, entity_id, entity_type, "adjusted", detail, actor).await
    }

    async fn log(
        executor: &mut SqlxTransaction<'_, Postgres>,
        entity_id: Uuid,
        entity_type: &str,
        action: &str,
        detail: serde_json::Value,
        actor: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (entity_id, entity_type, action, detail, actor)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entity_id)
        .bind(entity_type)
        .bind(action)
        .bind(detail)
        .bind(actor)
        .execute(&mut **executor)
        .await?;

        Ok(())
    }
}
