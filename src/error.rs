use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Domain error for the payment orchestration subsystem. Every variant maps
/// to a stable machine-readable code surfaced to API callers; provider
/// credentials and internals never leak into responses.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no payment provider available for tenant")]
    NoProviderAvailable,

    #[error("daily transaction volume limit exceeded")]
    DailyLimitExceeded,

    #[error("idempotency key reused with a different request payload")]
    IdempotencyMismatch,

    #[error("a request with this idempotency key is already in progress")]
    RequestInProgress,

    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("invalid refund amount: {0}")]
    InvalidRefundAmount(String),

    #[error("cumulative refunds would exceed the original charge amount")]
    RefundLimitExceeded,

    #[error("payment declined: {message}")]
    ProviderDeclined { code: String, message: String },

    #[error("payment processing failed: {message}")]
    Processing {
        message: String,
        provider_error: Option<String>,
    },

    #[error("refund failed: {message}")]
    RefundFailed {
        message: String,
        provider_error: Option<String>,
    },

    #[error("credential lookup failed: {0}")]
    Credentials(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    pub fn error_code(&self) -> &str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::NoProviderAvailable => "NO_PROVIDER_AVAILABLE",
            PaymentError::DailyLimitExceeded => "DAILY_LIMIT_EXCEEDED",
            PaymentError::IdempotencyMismatch => "IDEMPOTENCY_MISMATCH",
            PaymentError::RequestInProgress => "REQUEST_IN_PROGRESS",
            PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            PaymentError::InvalidRefundAmount(_) => "INVALID_REFUND_AMOUNT",
            PaymentError::RefundLimitExceeded => "REFUND_LIMIT_EXCEEDED",
            // Business declines pass the provider's own code through.
            PaymentError::ProviderDeclined { code, .. } => code,
            PaymentError::Processing { .. } => "PROCESSING_ERROR",
            PaymentError::RefundFailed { .. } => "REFUND_ERROR",
            PaymentError::Credentials(_) => "CREDENTIAL_ERROR",
            PaymentError::Database(_) | PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) | PaymentError::InvalidRefundAmount(_) => {
                StatusCode::BAD_REQUEST
            }
            PaymentError::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::DailyLimitExceeded | PaymentError::RefundLimitExceeded => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PaymentError::IdempotencyMismatch | PaymentError::RequestInProgress => {
                StatusCode::CONFLICT
            }
            PaymentError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::ProviderDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            PaymentError::Processing { .. } | PaymentError::RefundFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PaymentError::Credentials(_)
            | PaymentError::Database(_)
            | PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal failures get a generic message; everything else is safe
        // to surface verbatim.
        let message = match &self {
            PaymentError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            PaymentError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            PaymentError::Credentials(e) => {
                tracing::error!(error = %e, "credential lookup failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error_code": self.error_code(),
            "message": message,
        });

        if let PaymentError::Processing {
            provider_error: Some(inner),
            ..
        }
        | PaymentError::RefundFailed {
            provider_error: Some(inner),
            ..
        } = &self
        {
            body["provider_error"] = json!(inner);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            PaymentError::NoProviderAvailable.error_code(),
            "NO_PROVIDER_AVAILABLE"
        );
        assert_eq!(
            PaymentError::DailyLimitExceeded.error_code(),
            "DAILY_LIMIT_EXCEEDED"
        );
        assert_eq!(
            PaymentError::IdempotencyMismatch.error_code(),
            "IDEMPOTENCY_MISMATCH"
        );
        assert_eq!(
            PaymentError::RefundLimitExceeded.error_code(),
            "REFUND_LIMIT_EXCEEDED"
        );
        assert_eq!(
            PaymentError::Processing {
                message: "x".into(),
                provider_error: None
            }
            .error_code(),
            "PROCESSING_ERROR"
        );
    }

    #[test]
    fn declines_pass_provider_code_through() {
        let err = PaymentError::ProviderDeclined {
            code: "INSUFFICIENT_FUNDS".to_string(),
            message: "insufficient funds".to_string(),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err = PaymentError::Validation("amount must be positive".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_statuses_for_idempotency() {
        assert_eq!(
            PaymentError::IdempotencyMismatch.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PaymentError::RequestInProgress.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn database_errors_are_not_leaked() {
        let err = PaymentError::Database(sqlx::Error::RowNotFound);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
