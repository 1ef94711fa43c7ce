use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::db::models::ProviderType;
use crate::secrets::ProviderCredentials;

use super::{
    map_reqwest_error, ChargeRequest, ProviderAdapter, ProviderCallStatus, ProviderError,
    ProviderResponse,
};

/// HTTP adapter for the Stronghold Pay API. Stronghold wraps results in an
/// envelope with a `result` object and reports failures as a `pay_error`.
pub struct StrongholdAdapter {
    client: Client,
    base_url: String,
    credentials: ProviderCredentials,
}

#[derive(Debug, Deserialize)]
struct StrongholdEnvelope {
    #[serde(default)]
    result: Option<StrongholdCharge>,
    #[serde(default)]
    error: Option<StrongholdError>,
}

#[derive(Debug, Deserialize)]
struct StrongholdCharge {
    id: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct StrongholdError {
    code: String,
    message: String,
}

impl StrongholdAdapter {
    pub fn new(base_url: String, credentials: ProviderCredentials, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        StrongholdAdapter {
            client,
            base_url,
            credentials,
        }
    }

    fn secret_key(&self) -> Result<&str, ProviderError> {
        self.credentials
            .get("secret_key")
            .ok_or_else(|| ProviderError::Auth("stronghold secret_key missing".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn normalize(&self, envelope: StrongholdEnvelope) -> Result<ProviderResponse, ProviderError> {
        if let Some(error) = envelope.error {
            return Ok(ProviderResponse {
                status: ProviderCallStatus::Declined,
                provider_transaction_id: None,
                error_code: Some(error.code),
                error_message: Some(error.message),
                metadata: json!({ "provider": "stronghold" }),
            });
        }

        let charge = envelope.result.ok_or_else(|| {
            ProviderError::InvalidResponse("stronghold envelope missing result".to_string())
        })?;

        match charge.state.as_str() {
            "captured" | "authorized" => Ok(ProviderResponse {
                status: ProviderCallStatus::Approved,
                provider_transaction_id: Some(charge.id),
                error_code: None,
                error_message: None,
                metadata: json!({ "provider": "stronghold" }),
            }),
            other => Err(ProviderError::InvalidResponse(format!(
                "unknown stronghold charge state: {}",
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
            .header("SH-SECRET-KEY", self.secret_key()?)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if response.status() == 401 || response.status() == 403 {
            return Err(ProviderError::Auth(
                "stronghold rejected credentials".to_string(),
            ));
        }

        let envelope: StrongholdEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.normalize(envelope)
    }
}

#[async_trait]
impl ProviderAdapter for StrongholdAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Stronghold
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ProviderResponse, ProviderError> {
        let body = json!({
            "amount": request.amount.to_string(),
            "currency": request.currency,
            "external_id": request.reference,
            "payment_source_id": request.payment_method_id.map(|id| id.to_string()),
            "customer_id": request.customer_id.map(|id| id.to_string()),
        });

        self.post("/v2/charges", body).await
    }

    async fn refund(
        &self,
        provider_transaction_id: &str,
        amount: &BigDecimal,
        reason: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let body = json!({
            "charge_id": provider_transaction_id,
            "amount": amount.to_string(),
            "reason": reason,
        });

        self.post("/v2/refunds", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;
    use uuid::Uuid;

    fn test_credentials() -> ProviderCredentials {
        ProviderCredentials::new(HashMap::from([(
            "secret_key".to_string(),
            "sh_sk_test".to_string(),
        )]))
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            tenant_id: Uuid::new_v4(),
            reference: "txn_f00dfeedbeef".to_string(),
            amount: BigDecimal::from_str("25.50").unwrap(),
            currency: "USD".to_string(),
            payment_method_id: Some(Uuid::new_v4()),
            order_id: None,
            customer_id: Some(Uuid::new_v4()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn captured_charge_is_approved() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/charges")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result": {"id": "ch_42", "state": "captured"}}"#)
            .create_async()
            .await;

        let adapter =
            StrongholdAdapter::new(server.url(), test_credentials(), Duration::from_secs(5));
        let response = adapter.charge(&charge_request()).await.unwrap();

        assert!(response.is_approved());
        assert_eq!(response.provider_transaction_id.as_deref(), Some("ch_42"));
    }

    #[tokio::test]
    async fn pay_error_becomes_decline() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/charges")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"code": "LINKED_ACCOUNT_INACTIVE", "message": "bank link expired"}}"#,
            )
            .create_async()
            .await;

        let adapter =
            StrongholdAdapter::new(server.url(), test_credentials(), Duration::from_secs(5));
        let response = adapter.charge(&charge_request()).await.unwrap();

        assert_eq!(response.status, ProviderCallStatus::Declined);
        assert_eq!(
            response.error_code.as_deref(),
            Some("LINKED_ACCOUNT_INACTIVE")
        );
    }

    #[tokio::test]
    async fn malformed_envelope_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/charges")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let adapter =
            StrongholdAdapter::new(server.url(), test_credentials(), Duration::from_secs(5));
        let result = adapter.charge(&charge_request()).await;

        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
