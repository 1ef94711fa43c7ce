use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::db::models::ProviderType;
use crate::secrets::ProviderCredentials;

use super::{
    map_reqwest_error, ChargeRequest, ProviderAdapter, ProviderCallStatus, ProviderError,
    ProviderResponse,
};

/// HTTP adapter for the Aeropay ACH transfer API.
pub struct AeropayAdapter {
    client: Client,
    base_url: String,
    credentials: ProviderCredentials,
}

#[derive(Debug, Serialize)]
struct AeropayChargeBody<'a> {
    merchant_id: &'a str,
    amount: String,
    currency: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AeropayTransactionResponse {
    status: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    decline_reason: Option<String>,
}

impl AeropayAdapter {
    pub fn new(base_url: String, credentials: ProviderCredentials, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        AeropayAdapter {
            client,
            base_url,
            credentials,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.credentials
            .get("api_key")
            .ok_or_else(|| ProviderError::Auth("aeropay api_key missing".to_string()))
    }

    fn merchant_id(&self) -> Result<&str, ProviderError> {
        self.credentials
            .get("merchant_id")
            .ok_or_else(|| ProviderError::Auth("aeropay merchant_id missing".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn normalize(&self, body: AeropayTransactionResponse) -> Result<ProviderResponse, ProviderError> {
        match body.status.as_str() {
            "approved" | "settled" => Ok(ProviderResponse {
                status: ProviderCallStatus::Approved,
                provider_transaction_id: body.transaction_id,
                error_code: None,
                error_message: None,
                metadata: json!({ "provider": "aeropay" }),
            }),
            "declined" => Ok(ProviderResponse {
                status: ProviderCallStatus::Declined,
                provider_transaction_id: body.transaction_id,
                error_code: Some(body.decline_code.unwrap_or_else(|| "DECLINED".to_string())),
                error_message: Some(
                    body.decline_reason
                        .unwrap_or_else(|| "payment declined".to_string()),
                ),
                metadata: json!({ "provider": "aeropay" }),
            }),
            other => Err(ProviderError::InvalidResponse(format!(
                "unknown aeropay status: {}",
                other
            ))),
        }
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status() == 401 || response.status() == 403 {
            return Err(ProviderError::Auth("aeropay rejected credentials".to_string()));
        }

        let parsed: AeropayTransactionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.normalize(parsed)
    }
}

#[async_trait]
impl ProviderAdapter for AeropayAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Aeropay
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ProviderResponse, ProviderError> {
        let body = AeropayChargeBody {
            merchant_id: self.merchant_id()?,
            amount: request.amount.to_string(),
            currency: &request.currency,
            reference: &request.reference,
            payment_method: request.payment_method_id.map(|id| id.to_string()),
        };

        self.post("/v1/transactions", serde_json::to_value(&body).unwrap_or_default())
            .await
    }

    async fn refund(
        &self,
        provider_transaction_id: &str,
        amount: &BigDecimal,
        reason: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let body = json!({
            "merchant_id": self.merchant_id()?,
            "transaction_id": provider_transaction_id,
            "amount": amount.to_string(),
            "reason": reason,
        });

        self.post("/v1/refunds", body).await
    }
}
