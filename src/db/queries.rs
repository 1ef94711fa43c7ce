use crate::db::models::{
    FeeSplit, IdempotencyKey, Refund, TenantProvider, Transaction, TransactionStatus,
};
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

// --- Transaction queries ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, reference, tenant_id, store_id, order_id, payment_method_id,
            provider, transaction_type, status, amount, currency,
            provider_transaction_id, provider_response, error_code, error_message,
            metadata, idempotency_key, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(&tx.reference)
    .bind(tx.tenant_id)
    .bind(tx.store_id)
    .bind(tx.order_id)
    .bind(tx.payment_method_id)
    .bind(tx.provider)
    .bind(tx.transaction_type)
    .bind(tx.status)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(&tx.provider_transaction_id)
    .bind(&tx.provider_response)
    .bind(&tx.error_code)
    .bind(&tx.error_message)
    .bind(&tx.metadata)
    .bind(&tx.idempotency_key)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Locks the row for the remainder of the enclosing database transaction.
/// The refund-sum check and refund insert run under this lock so two
/// concurrent partial refunds cannot both pass against stale sums.
pub async fn get_transaction_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn mark_transaction_completed(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    provider_transaction_id: &str,
    provider_response: &serde_json::Value,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'completed',
            provider_transaction_id = $2,
            provider_response = $3,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(provider_transaction_id)
    .bind(provider_response)
    .fetch_one(&mut **executor)
    .await
}

pub async fn mark_transaction_failed(
    pool: &PgPool,
    id: Uuid,
    error_code: &str,
    error_message: &str,
    provider_response: Option<&serde_json::Value>,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'failed',
            error_code = $2,
            error_message = $3,
            provider_response = $4,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(error_code)
    .bind(error_message)
    .bind(provider_response)
    .fetch_one(pool)
    .await
}

/// Today's charge volume for a tenant, counting pending charges so that
/// in-flight requests reserve their amount against the daily limit.
pub async fn daily_charge_volume(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tenant_id: Uuid,
) -> Result<BigDecimal> {
    sqlx::query_scalar::<_, BigDecimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM transactions
        WHERE tenant_id = $1
          AND transaction_type = 'charge'
          AND status IN ('pending', 'completed')
          AND created_at >= date_trunc('day', NOW())
        "#,
    )
    .bind(tenant_id)
    .fetch_one(&mut **executor)
    .await
}

/// Serializes concurrent charge admission for one tenant within the
/// enclosing database transaction (released automatically at commit).
pub async fn acquire_tenant_charge_lock(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tenant_id: Uuid,
) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(tenant_id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

// --- Refund queries ---

pub async fn insert_refund(
    executor: &mut SqlxTransaction<'_, Postgres>,
    refund: &Refund,
) -> Result<Refund> {
    sqlx::query_as::<_, Refund>(
        r#"
        INSERT INTO refunds (
            id, original_transaction_id, transaction_id, amount, reason,
            status, provider_refund_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(refund.id)
    .bind(refund.original_transaction_id)
    .bind(refund.transaction_id)
    .bind(&refund.amount)
    .bind(&refund.reason)
    .bind(refund.status)
    .bind(&refund.provider_refund_id)
    .bind(refund.created_at)
    .fetch_one(&mut **executor)
    .await
}

/// Sum of refunds already held against a charge. Pending refunds count, so
/// an in-flight refund reserves its amount.
pub async fn refunded_amount(
    executor: &mut SqlxTransaction<'_, Postgres>,
    original_transaction_id: Uuid,
) -> Result<BigDecimal> {
    sqlx::query_scalar::<_, BigDecimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM refunds
        WHERE original_transaction_id = $1
          AND status IN ('pending', 'completed')
        "#,
    )
    .bind(original_transaction_id)
    .fetch_one(&mut **executor)
    .await
}

pub async fn update_refund_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    status: TransactionStatus,
    provider_refund_id: Option<&str>,
) -> Result<Refund> {
    sqlx::query_as::<_, Refund>(
        r#"
        UPDATE refunds
        SET status = $2, provider_refund_id = COALESCE($3, provider_refund_id)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(provider_refund_id)
    .fetch_one(&mut **executor)
    .await
}

// --- Fee split queries ---

pub async fn insert_fee_split(
    executor: &mut SqlxTransaction<'_, Postgres>,
    split: &FeeSplit,
) -> Result<FeeSplit> {
    sqlx::query_as::<_, FeeSplit>(
        r#"
        INSERT INTO fee_splits (
            id, transaction_id, tenant_id, gross_amount, percentage_fee,
            fixed_fee, platform_fee, tenant_net_amount, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(split.id)
    .bind(split.transaction_id)
    .bind(split.tenant_id)
    .bind(&split.gross_amount)
    .bind(&split.percentage_fee)
    .bind(&split.fixed_fee)
    .bind(&split.platform_fee)
    .bind(&split.tenant_net_amount)
    .bind(split.created_at)
    .bind(split.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_fee_split(pool: &PgPool, transaction_id: Uuid) -> Result<Option<FeeSplit>> {
    sqlx::query_as::<_, FeeSplit>("SELECT * FROM fee_splits WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_fee_split_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    transaction_id: Uuid,
) -> Result<Option<FeeSplit>> {
    sqlx::query_as::<_, FeeSplit>(
        "SELECT * FROM fee_splits WHERE transaction_id = $1 FOR UPDATE",
    )
    .bind(transaction_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn update_fee_split_amounts(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    platform_fee: &BigDecimal,
    tenant_net_amount: &BigDecimal,
) -> Result<FeeSplit> {
    sqlx::query_as::<_, FeeSplit>(
        r#"
        UPDATE fee_splits
        SET platform_fee = $2, tenant_net_amount = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(platform_fee)
    .bind(tenant_net_amount)
    .fetch_one(&mut **executor)
    .await
}

// --- Tenant provider configuration ---

pub async fn list_tenant_providers(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<TenantProvider>> {
    sqlx::query_as::<_, TenantProvider>(
        r#"
        SELECT * FROM tenant_providers
        WHERE tenant_id = $1 AND enabled = TRUE
        ORDER BY priority ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

// --- Idempotency queries ---

/// Atomic insert-if-absent claim. Returns the inserted row, or `None` when
/// another request already holds the key.
pub async fn claim_idempotency_key(
    pool: &PgPool,
    tenant_id: Uuid,
    key: &str,
    request_hash: &str,
) -> Result<Option<IdempotencyKey>> {
    sqlx::query_as::<_, IdempotencyKey>(
        r#"
        INSERT INTO idempotency_keys (
            tenant_id, idempotency_key, request_hash, status, created_at, updated_at
        ) VALUES ($1, $2, $3, 'processing', NOW(), NOW())
        ON CONFLICT (tenant_id, idempotency_key) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(key)
    .bind(request_hash)
    .fetch_optional(pool)
    .await
}

pub async fn get_idempotency_key(
    pool: &PgPool,
    tenant_id: Uuid,
    key: &str,
) -> Result<Option<IdempotencyKey>> {
    sqlx::query_as::<_, IdempotencyKey>(
        "SELECT * FROM idempotency_keys WHERE tenant_id = $1 AND idempotency_key = $2",
    )
    .bind(tenant_id)
    .bind(key)
    .fetch_optional(pool)
    .await
}

pub async fn complete_idempotency_key(
    pool: &PgPool,
    tenant_id: Uuid,
    key: &str,
    response: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE idempotency_keys
        SET status = 'completed', response = $3, updated_at = NOW()
        WHERE tenant_id = $1 AND idempotency_key = $2
        "#,
    )
    .bind(tenant_id)
    .bind(key)
    .bind(response)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_idempotency_key(pool: &PgPool, tenant_id: Uuid, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM idempotency_keys WHERE tenant_id = $1 AND idempotency_key = $2")
        .bind(tenant_id)
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn purge_idempotency_keys(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
