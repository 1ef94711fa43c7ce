use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment processors the platform can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "provider_type", rename_all = "snake_case")]
pub enum ProviderType {
    Aeropay,
    Stronghold,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Aeropay => write!(f, "aeropay"),
            ProviderType::Stronghold => write!(f, "stronghold"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aeropay" => Ok(ProviderType::Aeropay),
            "stronghold" => Ok(ProviderType::Stronghold),
            other => Err(format!("unknown provider type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
pub enum TransactionType {
    Charge,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "idempotency_status", rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}

/// Ledger row for a charge or refund. Immutable once completed; refunds are
/// new rows referencing the original charge, never mutations of it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub tenant_id: Uuid,
    pub store_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub provider: ProviderType,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider_transaction_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new_charge(
        tenant_id: Uuid,
        store_id: Option<Uuid>,
        order_id: Option<Uuid>,
        payment_method_id: Option<Uuid>,
        provider: ProviderType,
        amount: BigDecimal,
        currency: String,
        metadata: Option<serde_json::Value>,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            reference: transaction_reference("txn", id),
            tenant_id,
            store_id,
            order_id,
            payment_method_id,
            provider,
            transaction_type: TransactionType::Charge,
            status: TransactionStatus::Pending,
            amount,
            currency,
            provider_transaction_id: None,
            provider_response: None,
            error_code: None,
            error_message: None,
            metadata,
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Companion ledger row for a refund; inherits the original's routing so
    /// the refund is never sent to a different provider.
    pub fn new_refund(original: &Transaction, amount: BigDecimal) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            reference: transaction_reference("rfn", id),
            tenant_id: original.tenant_id,
            store_id: original.store_id,
            order_id: original.order_id,
            payment_method_id: original.payment_method_id,
            provider: original.provider,
            transaction_type: TransactionType::Refund,
            status: TransactionStatus::Pending,
            amount,
            currency: original.currency.clone(),
            provider_transaction_id: None,
            provider_response: None,
            error_code: None,
            error_message: None,
            metadata: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Human-readable reference, e.g. `txn_3f2a9c1d8b4e`.
fn transaction_reference(prefix: &str, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("{}_{}", prefix, &simple[..12])
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub original_transaction_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub status: TransactionStatus,
    pub provider_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FeeSplit {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub gross_amount: BigDecimal,
    pub percentage_fee: BigDecimal,
    pub fixed_fee: BigDecimal,
    pub platform_fee: BigDecimal,
    pub tenant_net_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub tenant_id: Uuid,
    pub idempotency_key: String,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-tenant provider configuration, priority-ordered for failover.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TenantProvider {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: ProviderType,
    pub priority: i32,
    pub api_base_url: String,
    pub percentage_fee: Option<BigDecimal>,
    pub fixed_fee: Option<BigDecimal>,
    pub daily_limit: Option<BigDecimal>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn charge_starts_pending_with_reference() {
        let tx = Transaction::new_charge(
            Uuid::new_v4(),
            None,
            None,
            None,
            ProviderType::Aeropay,
            BigDecimal::from_str("100.00").unwrap(),
            "CAD".to_string(),
            None,
            None,
        );

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.transaction_type, TransactionType::Charge);
        assert!(tx.reference.starts_with("txn_"));
        assert!(tx.provider_transaction_id.is_none());
    }

    #[test]
    fn refund_inherits_original_routing() {
        let original = Transaction::new_charge(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            None,
            None,
            ProviderType::Stronghold,
            BigDecimal::from(50),
            "USD".to_string(),
            None,
            None,
        );
        let refund = Transaction::new_refund(&original, BigDecimal::from(20));

        assert_eq!(refund.tenant_id, original.tenant_id);
        assert_eq!(refund.provider, ProviderType::Stronghold);
        assert_eq!(refund.transaction_type, TransactionType::Refund);
        assert!(refund.reference.starts_with("rfn_"));
    }

    #[test]
    fn provider_type_round_trips_through_str() {
        for provider in [ProviderType::Aeropay, ProviderType::Stronghold] {
            let parsed = ProviderType::from_str(&provider.to_string()).unwrap();
            assert_eq!(parsed, provider);
        }
        assert!(ProviderType::from_str("square").is_err());
    }
}
