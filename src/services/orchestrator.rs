use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::{ProviderType, Transaction, TransactionStatus};
use crate::error::PaymentError;
use crate::providers::ChargeRequest;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::fees::FeeSplitCalculator;
use crate::services::idempotency::{ClaimOutcome, IdempotencyStore};
use crate::services::ledger::{NewCharge, TransactionLedger};
use crate::services::retry::{RetryError, RetryExecutor};
use crate::services::selector::ProviderSelector;
use crate::validation;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub tenant_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub provider_type: Option<ProviderType>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub transaction_reference: String,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider: ProviderType,
    pub provider_transaction_id: Option<String>,
}

impl TransactionResult {
    fn from_transaction(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            transaction_reference: tx.reference.clone(),
            status: tx.status,
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            provider: tx.provider,
            provider_transaction_id: tx.provider_transaction_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<BigDecimal>,
    pub reason: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub reason: Option<String>,
}

/// Top-level façade over provider selection, idempotent retries, and the
/// ledger. Constructed once per process and shared by reference; all
/// durable state lives in the database so multiple instances can run
/// side by side.
pub struct PaymentOrchestrator {
    ledger: TransactionLedger,
    selector: ProviderSelector,
    idempotency: IdempotencyStore,
    retry: RetryExecutor,
    fees: FeeSplitCalculator,
    breaker: Arc<CircuitBreaker>,
}

impl PaymentOrchestrator {
    pub fn new(
        ledger: TransactionLedger,
        selector: ProviderSelector,
        idempotency: IdempotencyStore,
        retry: RetryExecutor,
        fees: FeeSplitCalculator,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            ledger,
            selector,
            idempotency,
            retry,
            fees,
            breaker,
        }
    }

    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    pub async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<TransactionResult, PaymentError> {
        validation::validate_positive_amount(&request.amount)
            .map_err(|e| PaymentError::Validation(e.to_string()))?;
        validation::validate_currency(&request.currency)
            .map_err(|e| PaymentError::Validation(e.to_string()))?;
        if let Some(key) = &request.idempotency_key {
            validation::validate_idempotency_key(key)
                .map_err(|e| PaymentError::Validation(e.to_string()))?;
        }

        let claim_key = match &request.idempotency_key {
            Some(key) => {
                let hash = IdempotencyStore::request_hash(&payment_hash_fields(&request));
                match self.idempotency.claim(request.tenant_id, key, &hash).await? {
                    ClaimOutcome::Claimed => Some(key.clone()),
                    ClaimOutcome::Completed(cached) => {
                        tracing::info!(
                            tenant_id = %request.tenant_id,
                            idempotency_key = %key,
                            "replaying cached payment result"
                        );
                        let result: TransactionResult = serde_json::from_value(cached)
                            .map_err(|e| {
                                PaymentError::Internal(format!(
                                    "cached idempotency response is unreadable: {}",
                                    e
                                ))
                            })?;
                        return Ok(result);
                    }
                    ClaimOutcome::InProgress => return Err(PaymentError::RequestInProgress),
                    ClaimOutcome::Mismatch => return Err(PaymentError::IdempotencyMismatch),
                }
            }
            None => None,
        };

        let outcome = self.execute_charge(&request).await;

        match (&outcome, claim_key) {
            (Ok(result), Some(key)) => {
                let cached = serde_json::to_value(result)
                    .map_err(|e| PaymentError::Internal(e.to_string()))?;
                self.idempotency
                    .complete(request.tenant_id, &key, &cached)
                    .await?;
            }
            (Err(_), Some(key)) => {
                // Release the claim so the client can retry with the same key.
                if let Err(e) = self.idempotency.release(request.tenant_id, &key).await {
                    tracing::error!(
                        tenant_id = %request.tenant_id,
                        error = %e,
                        "failed to release idempotency claim"
                    );
                }
            }
            _ => {}
        }

        outcome
    }

    async fn execute_charge(
        &self,
        request: &PaymentRequest,
    ) -> Result<TransactionResult, PaymentError> {
        let selected = self
            .selector
            .get_provider(request.tenant_id, request.provider_type)
            .await?
            .ok_or(PaymentError::NoProviderAvailable)?;

        let provider = selected.config.provider;

        let pending = self
            .ledger
            .begin_charge(NewCharge {
                tenant_id: request.tenant_id,
                store_id: request.store_id,
                order_id: request.order_id,
                payment_method_id: request.payment_method_id,
                provider,
                amount: request.amount.clone(),
                currency: request.currency.clone(),
                metadata: request.metadata.clone(),
                idempotency_key: request.idempotency_key.clone(),
                daily_limit: selected.config.daily_limit.clone(),
            })
            .await?;

        tracing::info!(
            tenant_id = %request.tenant_id,
            reference = %pending.reference,
            provider = %provider,
            amount = %pending.amount,
            "processing payment"
        );

        let charge_request = ChargeRequest {
            tenant_id: request.tenant_id,
            reference: pending.reference.clone(),
            amount: pending.amount.clone(),
            currency: pending.currency.clone(),
            payment_method_id: request.payment_method_id,
            order_id: request.order_id,
            customer_id: request.customer_id,
            metadata: request.metadata.clone(),
        };

        let call = self
            .retry
            .execute("charge", || selected.adapter.charge(&charge_request))
            .await;

        match call {
            Ok(response) if response.is_approved() => {
                let provider_transaction_id = match response.provider_transaction_id.as_deref() {
                    Some(id) => id.to_string(),
                    None => {
                        return self
                            .fail_charge(
                                &pending,
                                provider,
                                "PROCESSING_ERROR",
                                "provider approved without a transaction id",
                                None,
                            )
                            .await;
                    }
                };

                let fee_config = self.fees.config_for(&selected.config);
                let breakdown = self.fees.split(&pending.amount, &fee_config);
                let provider_response = serde_json::to_value(&response)
                    .map_err(|e| PaymentError::Internal(e.to_string()))?;

                let completed = self
                    .ledger
                    .complete_charge(
                        pending.id,
                        pending.tenant_id,
                        &provider_transaction_id,
                        &provider_response,
                        &breakdown,
                    )
                    .await?;

                self.breaker.record_success(request.tenant_id, provider);

                tracing::info!(
                    tenant_id = %request.tenant_id,
                    reference = %completed.reference,
                    provider_transaction_id = %provider_transaction_id,
                    "payment completed"
                );

                Ok(TransactionResult::from_transaction(&completed))
            }
            Ok(response) => {
                // Business decline: a normal outcome, recorded and surfaced
                // with the provider's own code. Never retried.
                let code = response
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "DECLINED".to_string());
                let message = response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "payment declined".to_string());
                let provider_response = serde_json::to_value(&response).ok();

                self.ledger
                    .fail_transaction(pending.id, &code, &message, provider_response.as_ref())
                    .await?;

                Err(PaymentError::ProviderDeclined { code, message })
            }
            Err(RetryError::MaxRetriesExceeded { attempts, source }) => {
                self.breaker.record_failure(request.tenant_id, provider);
                self.fail_charge(
                    &pending,
                    provider,
                    "MAX_RETRIES_EXCEEDED",
                    &format!("provider unreachable after {} attempts", attempts),
                    Some(source.to_string()),
                )
                .await
            }
            Err(RetryError::Provider(e)) => {
                self.breaker.record_failure(request.tenant_id, provider);
                self.fail_charge(
                    &pending,
                    provider,
                    "PROVIDER_ERROR",
                    "provider call failed",
                    Some(e.to_string()),
                )
                .await
            }
        }
    }

    async fn fail_charge(
        &self,
        pending: &Transaction,
        provider: ProviderType,
        error_code: &str,
        message: &str,
        provider_error: Option<String>,
    ) -> Result<TransactionResult, PaymentError> {
        let detail = provider_error
            .as_deref()
            .map(|e| format!("{}: {}", message, e))
            .unwrap_or_else(|| message.to_string());

        self.ledger
            .fail_transaction(pending.id, error_code, &detail, None)
            .await?;

        tracing::error!(
            tenant_id = %pending.tenant_id,
            reference = %pending.reference,
            provider = %provider,
            error_code,
            "payment processing failed"
        );

        Err(PaymentError::Processing {
            message: message.to_string(),
            provider_error,
        })
    }

    pub async fn refund_payment(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        request: RefundRequest,
    ) -> Result<RefundResult, PaymentError> {
        if let Some(amount) = &request.amount {
            validation::validate_positive_amount(amount)
                .map_err(|e| PaymentError::Validation(e.to_string()))?;
        }
        if let Some(reason) = &request.reason {
            validation::validate_max_len("reason", reason, validation::REASON_MAX_LEN)
                .map_err(|e| PaymentError::Validation(e.to_string()))?;
        }
        if let Some(key) = &request.idempotency_key {
            validation::validate_idempotency_key(key)
                .map_err(|e| PaymentError::Validation(e.to_string()))?;
        }

        let claim_key = match &request.idempotency_key {
            Some(key) => {
                let hash = IdempotencyStore::request_hash(&refund_hash_fields(
                    tenant_id,
                    transaction_id,
                    &request,
                ));
                match self.idempotency.claim(tenant_id, key, &hash).await? {
                    ClaimOutcome::Claimed => Some(key.clone()),
                    ClaimOutcome::Completed(cached) => {
                        let result: RefundResult =
                            serde_json::from_value(cached).map_err(|e| {
                                PaymentError::Internal(format!(
                                    "cached idempotency response is unreadable: {}",
                                    e
                                ))
                            })?;
                        return Ok(result);
                    }
                    ClaimOutcome::InProgress => return Err(PaymentError::RequestInProgress),
                    ClaimOutcome::Mismatch => return Err(PaymentError::IdempotencyMismatch),
                }
            }
            None => None,
        };

        let outcome = self
            .execute_refund(tenant_id, transaction_id, &request)
            .await;

        match (&outcome, claim_key) {
            (Ok(result), Some(key)) => {
                let cached = serde_json::to_value(result)
                    .map_err(|e| PaymentError::Internal(e.to_string()))?;
                self.idempotency.complete(tenant_id, &key, &cached).await?;
            }
            (Err(_), Some(key)) => {
                if let Err(e) = self.idempotency.release(tenant_id, &key).await {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "failed to release idempotency claim"
                    );
                }
            }
            _ => {}
        }

        outcome
    }

    async fn execute_refund(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        request: &RefundRequest,
    ) -> Result<RefundResult, PaymentError> {
        // Validation and the cumulative-refund check run under a row lock
        // before any provider call; the pending refund reserves its amount.
        let (original, refund, _refund_txn) = self
            .ledger
            .begin_refund(
                tenant_id,
                transaction_id,
                request.amount.clone(),
                request.reason.clone(),
            )
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            reference = %original.reference,
            amount = %refund.amount,
            "processing refund"
        );

        // Refunds go back through the provider that took the charge.
        let selected = match self
            .selector
            .get_provider_for_refund(tenant_id, original.provider)
            .await?
        {
            Some(selected) => selected,
            None => {
                self.ledger
                    .fail_refund(
                        &refund,
                        "NO_PROVIDER_AVAILABLE",
                        "original provider is no longer resolvable",
                    )
                    .await?;
                return Err(PaymentError::NoProviderAvailable);
            }
        };

        let provider_transaction_id =
            original.provider_transaction_id.clone().ok_or_else(|| {
                PaymentError::Internal(format!(
                    "completed charge {} has no provider transaction id",
                    original.id
                ))
            })?;

        let call = self
            .retry
            .execute("refund", || {
                selected.adapter.refund(
                    &provider_transaction_id,
                    &refund.amount,
                    request.reason.as_deref(),
                )
            })
            .await;

        match call {
            Ok(response) if response.is_approved() => {
                let fee_adjustment = if refund.amount < original.amount {
                    match self.ledger.get_fee_split(original.id).await? {
                        Some(split) => Some(self.fees.adjust_for_refund(&split, &refund.amount)),
                        None => {
                            tracing::error!(
                                reference = %original.reference,
                                "no fee split found for partial refund adjustment"
                            );
                            None
                        }
                    }
                } else {
                    // Full refund zeroes the split.
                    self.ledger
                        .get_fee_split(original.id)
                        .await?
                        .map(|split| self.fees.adjust_for_refund(&split, &refund.amount))
                };

                let provider_response = serde_json::to_value(&response)
                    .map_err(|e| PaymentError::Internal(e.to_string()))?;

                let completed = self
                    .ledger
                    .complete_refund(
                        &refund,
                        response.provider_transaction_id.as_deref(),
                        &provider_response,
                        fee_adjustment,
                    )
                    .await?;

                self.breaker.record_success(tenant_id, original.provider);

                tracing::info!(
                    tenant_id = %tenant_id,
                    reference = %original.reference,
                    refund_id = %completed.id,
                    "refund completed"
                );

                Ok(RefundResult {
                    refund_id: completed.id,
                    transaction_id: original.id,
                    amount: completed.amount.clone(),
                    status: completed.status,
                    reason: completed.reason.clone(),
                })
            }
            Ok(response) => {
                let code = response
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "REFUND_DECLINED".to_string());
                let message = response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "refund declined".to_string());

                self.ledger.fail_refund(&refund, &code, &message).await?;

                Err(PaymentError::ProviderDeclined { code, message })
            }
            Err(RetryError::MaxRetriesExceeded { attempts, source }) => {
                self.breaker.record_failure(tenant_id, original.provider);
                self.ledger
                    .fail_refund(
                        &refund,
                        "MAX_RETRIES_EXCEEDED",
                        &format!("provider unreachable after {} attempts", attempts),
                    )
                    .await?;

                Err(PaymentError::RefundFailed {
                    message: "provider unreachable, retries exhausted".to_string(),
                    provider_error: Some(source.to_string()),
                })
            }
            Err(RetryError::Provider(e)) => {
                self.breaker.record_failure(tenant_id, original.provider);
                self.ledger
                    .fail_refund(&refund, "PROVIDER_ERROR", &e.to_string())
                    .await?;

                Err(PaymentError::RefundFailed {
                    message: "provider call failed".to_string(),
                    provider_error: Some(e.to_string()),
                })
            }
        }
    }

    pub async fn get_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, PaymentError> {
        self.ledger
            .get_tenant_transaction(tenant_id, transaction_id)
            .await
    }
}

/// Logically significant fields for payment idempotency. Field order is
/// fixed so the hash is stable across calls.
fn payment_hash_fields(request: &PaymentRequest) -> serde_json::Value {
    json!({
        "tenant_id": request.tenant_id,
        "amount": request.amount.to_string(),
        "currency": request.currency,
        "payment_method_id": request.payment_method_id,
        "order_id": request.order_id,
        "customer_id": request.customer_id,
        "provider_type": request.provider_type,
    })
}

fn refund_hash_fields(
    tenant_id: Uuid,
    transaction_id: Uuid,
    request: &RefundRequest,
) -> serde_json::Value {
    json!({
        "tenant_id": tenant_id,
        "transaction_id": transaction_id,
        "amount": request.amount.as_ref().map(|a| a.to_string()),
        "reason": request.reason,
    })
}
