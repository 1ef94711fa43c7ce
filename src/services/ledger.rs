use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::audit::{AuditLog, ENTITY_FEE_SPLIT, ENTITY_REFUND, ENTITY_TRANSACTION};
use crate::db::models::{
    FeeSplit, ProviderType, Refund, Transaction, TransactionStatus, TransactionType,
};
use crate::db::queries;
use crate::error::PaymentError;
use crate::services::fees::FeeBreakdown;

const ACTOR_SYSTEM: &str = "system";

/// Parameters for admitting a new charge into the ledger.
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub tenant_id: Uuid,
    pub store_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub provider: ProviderType,
    pub amount: BigDecimal,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    /// Tenant's configured daily volume ceiling, if the provider defines one.
    pub daily_limit: Option<BigDecimal>,
}

/// System of record for charges, refunds, and fee splits. All multi-row
/// invariants (refund sums, daily limits) are enforced inside a single
/// database transaction with row locking, never via in-process state, since
/// multiple orchestrator instances may run against the same store.
#[derive(Clone)]
pub struct TransactionLedger {
    pool: PgPool,
}

impl TransactionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Admits a charge: checks the daily volume limit and inserts the
    /// pending row atomically. A per-tenant advisory lock serializes
    /// concurrent admissions so two requests cannot both pass the limit
    /// check against stale sums.
    pub async fn begin_charge(&self, charge: NewCharge) -> Result<Transaction, PaymentError> {
        let mut tx = self.pool.begin().await?;

        if let Some(limit) = &charge.daily_limit {
            queries::acquire_tenant_charge_lock(&mut tx, charge.tenant_id).await?;
            let volume = queries::daily_charge_volume(&mut tx, charge.tenant_id).await?;
            if &volume + &charge.amount > *limit {
                tracing::warn!(
                    tenant_id = %charge.tenant_id,
                    volume = %volume,
                    amount = %charge.amount,
                    limit = %limit,
                    error_code = "DAILY_LIMIT_EXCEEDED",
                    "daily transaction volume limit exceeded"
                );
                return Err(PaymentError::DailyLimitExceeded);
            }
        }

        let record = Transaction::new_charge(
            charge.tenant_id,
            charge.store_id,
            charge.order_id,
            charge.payment_method_id,
            charge.provider,
            charge.amount,
            charge.currency,
            charge.metadata,
            charge.idempotency_key,
        );

        let inserted = queries::insert_transaction(&mut tx, &record).await?;

        AuditLog::log_creation(
            &mut tx,
            inserted.id,
            ENTITY_TRANSACTION,
            json!({
                "reference": inserted.reference,
                "tenant_id": inserted.tenant_id,
                "provider": inserted.provider,
                "amount": inserted.amount.to_string(),
                "currency": inserted.currency,
                "status": inserted.status,
            }),
            ACTOR_SYSTEM,
        )
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    /// Marks a charge completed and records its fee split in one atomic
    /// write. The provider never touches these rows; it only returned the
    /// response we persist here.
    pub async fn complete_charge(
        &self,
        transaction_id: Uuid,
        tenant_id: Uuid,
        provider_transaction_id: &str,
        provider_response: &serde_json::Value,
        fees: &FeeBreakdown,
    ) -> Result<Transaction, PaymentError> {
        let mut tx = self.pool.begin().await?;

        let completed = queries::mark_transaction_completed(
            &mut tx,
            transaction_id,
            provider_transaction_id,
            provider_response,
        )
        .await?;

        let now = Utc::now();
        let split = FeeSplit {
            id: Uuid::new_v4(),
            transaction_id,
            tenant_id,
            gross_amount: fees.gross.clone(),
            percentage_fee: fees.percentage_fee.clone(),
            fixed_fee: fees.fixed_fee.clone(),
            platform_fee: fees.platform_fee.clone(),
            tenant_net_amount: fees.tenant_net.clone(),
            created_at: now,
            updated_at: now,
        };
        queries::insert_fee_split(&mut tx, &split).await?;

        AuditLog::log_status_change(
            &mut tx,
            transaction_id,
            ENTITY_TRANSACTION,
            json!({
                "reference": completed.reference,
                "status": completed.status,
                "provider_transaction_id": provider_transaction_id,
                "platform_fee": fees.platform_fee.to_string(),
                "tenant_net_amount": fees.tenant_net.to_string(),
            }),
            ACTOR_SYSTEM,
        )
        .await?;

        tx.commit().await?;
        Ok(completed)
    }

    /// Records a provider or system failure against the pending row. Every
    /// failure path either lands here or errored before a row was created.
    pub async fn fail_transaction(
        &self,
        transaction_id: Uuid,
        error_code: &str,
        error_message: &str,
        provider_response: Option<&serde_json::Value>,
    ) -> Result<Transaction, PaymentError> {
        let failed = queries::mark_transaction_failed(
            &self.pool,
            transaction_id,
            error_code,
            error_message,
            provider_response,
        )
        .await?;

        tracing::warn!(
            tenant_id = %failed.tenant_id,
            reference = %failed.reference,
            error_code,
            "transaction failed"
        );

        Ok(failed)
    }

    pub async fn get_tenant_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, PaymentError> {
        let tx = queries::get_transaction(&self.pool, transaction_id)
            .await?
            .filter(|t| t.tenant_id == tenant_id)
            .ok_or(PaymentError::TransactionNotFound(transaction_id))?;
        Ok(tx)
    }

    /// Validates and reserves a refund: locks the original charge row,
    /// checks the cumulative-refund invariant under that lock, and inserts
    /// the pending refund plus its companion ledger row, all in one
    /// database transaction. Fails before any provider call.
    pub async fn begin_refund(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        amount: Option<BigDecimal>,
        reason: Option<String>,
    ) -> Result<(Transaction, Refund, Transaction), PaymentError> {
        let mut tx = self.pool.begin().await?;

        let original = queries::get_transaction_for_update(&mut tx, transaction_id)
            .await?
            .filter(|t| t.tenant_id == tenant_id)
            .ok_or(PaymentError::TransactionNotFound(transaction_id))?;

        if original.transaction_type != TransactionType::Charge
            || original.status != TransactionStatus::Completed
        {
            return Err(PaymentError::InvalidRefundAmount(
                "only completed charges can be refunded".to_string(),
            ));
        }

        let amount = amount.unwrap_or_else(|| original.amount.clone());
        if amount <= BigDecimal::from(0) {
            return Err(PaymentError::InvalidRefundAmount(
                "refund amount must be greater than zero".to_string(),
            ));
        }
        if amount > original.amount {
            return Err(PaymentError::InvalidRefundAmount(format!(
                "refund amount {} exceeds original charge amount {}",
                amount, original.amount
            )));
        }

        let already_refunded = queries::refunded_amount(&mut tx, original.id).await?;
        if &already_refunded + &amount > original.amount {
            tracing::warn!(
                tenant_id = %tenant_id,
                reference = %original.reference,
                already_refunded = %already_refunded,
                requested = %amount,
                error_code = "REFUND_LIMIT_EXCEEDED",
                "cumulative refunds would exceed original charge"
            );
            return Err(PaymentError::RefundLimitExceeded);
        }

        let refund_txn = Transaction::new_refund(&original, amount.clone());
        let refund_txn = queries::insert_transaction(&mut tx, &refund_txn).await?;

        let refund = Refund {
            id: Uuid::new_v4(),
            original_transaction_id: original.id,
            transaction_id: refund_txn.id,
            amount,
            reason,
            status: TransactionStatus::Pending,
            provider_refund_id: None,
            created_at: Utc::now(),
        };
        let refund = queries::insert_refund(&mut tx, &refund).await?;

        AuditLog::log_creation(
            &mut tx,
            refund.id,
            ENTITY_REFUND,
            json!({
                "original_transaction_id": original.id,
                "original_reference": original.reference,
                "amount": refund.amount.to_string(),
                "reason": refund.reason,
            }),
            ACTOR_SYSTEM,
        )
        .await?;

        tx.commit().await?;
        Ok((original, refund, refund_txn))
    }

    /// Finalizes a refund after provider approval. A partial refund also
    /// adjusts the fee split; the adjustment deltas are audit-logged so the
    /// in-place update keeps an inspectable history.
    pub async fn complete_refund(
        &self,
        refund: &Refund,
        provider_refund_id: Option<&str>,
        provider_response: &serde_json::Value,
        fee_adjustment: Option<(BigDecimal, BigDecimal)>,
    ) -> Result<Refund, PaymentError> {
        let mut tx = self.pool.begin().await?;

        let completed = queries::update_refund_status(
            &mut tx,
            refund.id,
            TransactionStatus::Completed,
            provider_refund_id,
        )
        .await?;

        queries::mark_transaction_completed(
            &mut tx,
            refund.transaction_id,
            provider_refund_id.unwrap_or_default(),
            provider_response,
        )
        .await?;

        if let Some((new_fee, new_net)) = fee_adjustment {
            let split = queries::get_fee_split_for_update(&mut tx, refund.original_transaction_id)
                .await?
                .ok_or_else(|| {
                    PaymentError::Internal(format!(
                        "no fee split recorded for transaction {}",
                        refund.original_transaction_id
                    ))
                })?;

            queries::update_fee_split_amounts(&mut tx, split.id, &new_fee, &new_net).await?;

            AuditLog::log_adjustment(
                &mut tx,
                split.id,
                ENTITY_FEE_SPLIT,
                json!({
                    "refund_id": refund.id,
                    "refund_amount": refund.amount.to_string(),
                    "platform_fee_before": split.platform_fee.to_string(),
                    "platform_fee_after": new_fee.to_string(),
                    "tenant_net_before": split.tenant_net_amount.to_string(),
                    "tenant_net_after": new_net.to_string(),
                }),
                ACTOR_SYSTEM,
            )
            .await?;
        }

        AuditLog::log_status_change(
            &mut tx,
            refund.id,
            ENTITY_REFUND,
            json!({
                "status": completed.status,
                "provider_refund_id": provider_refund_id,
            }),
            ACTOR_SYSTEM,
        )
        .await?;

        tx.commit().await?;
        Ok(completed)
    }

    /// Marks a reserved refund failed, releasing its hold on the
    /// cumulative-refund budget.
    pub async fn fail_refund(
        &self,
        refund: &Refund,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), PaymentError> {
        let mut tx = self.pool.begin().await?;

        queries::update_refund_status(&mut tx, refund.id, TransactionStatus::Failed, None).await?;
        tx.commit().await?;

        self.fail_transaction(refund.transaction_id, error_code, error_message, None)
            .await?;

        Ok(())
    }

    /// Looks up the fee split for a completed charge; used to compute the
    /// proportional adjustment before finalizing a partial refund.
    pub async fn get_fee_split(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<FeeSplit>, PaymentError> {
        let split = queries::get_fee_split(&self.pool, transaction_id).await?;
        Ok(split)
    }
}
