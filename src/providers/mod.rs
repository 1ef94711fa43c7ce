use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{ProviderType, TenantProvider};
use crate::secrets::ProviderCredentials;

pub mod aeropay;
pub mod stronghold;

pub use aeropay::AeropayAdapter;
pub use stronghold::StrongholdAdapter;

/// Failure while talking to a payment provider. Transient classes are
/// eligible for retry; everything else propagates immediately.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCallStatus {
    Approved,
    Declined,
}

/// Normalized provider response. Business declines come back as a
/// `Declined` response, not an error, so they are never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status: ProviderCallStatus,
    pub provider_transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl ProviderResponse {
    pub fn is_approved(&self) -> bool {
        self.status == ProviderCallStatus::Approved
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub tenant_id: Uuid,
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

/// Capability interface over a specific external payment API. Adapters only
/// translate requests and responses; the ledger owns all persistence.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    async fn charge(&self, request: &ChargeRequest) -> Result<ProviderResponse, ProviderError>;

    async fn refund(
        &self,
        provider_transaction_id: &str,
        amount: &BigDecimal,
        reason: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Adapter lookup keyed by provider type. Adding a processor means adding a
/// module and one arm here.
pub fn build_adapter(
    config: &TenantProvider,
    credentials: ProviderCredentials,
    timeout: Duration,
) -> Arc<dyn ProviderAdapter> {
    match config.provider {
        ProviderType::Aeropay => Arc::new(AeropayAdapter::new(
            config.api_base_url.clone(),
            credentials,
            timeout,
        )),
        ProviderType::Stronghold => Arc::new(StrongholdAdapter::new(
            config.api_base_url.clone(),
            credentials,
            timeout,
        )),
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e)
    }
}
