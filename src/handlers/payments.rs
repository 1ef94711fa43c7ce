use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::services::orchestrator::{PaymentRequest, RefundRequest};
use crate::AppState;

/// `POST /payments`
pub async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<PaymentRequest>,
) -> Result<impl IntoResponse, PaymentError> {
    let result = state.orchestrator.process_payment(payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub tenant_id: Uuid,
    #[serde(flatten)]
    pub refund: RefundRequest,
}

/// `POST /payments/:id/refunds`
pub async fn create_refund(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<RefundBody>,
) -> Result<impl IntoResponse, PaymentError> {
    let result = state
        .orchestrator
        .refund_payment(payload.tenant_id, transaction_id, payload.refund)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// `GET /payments/:id`
pub async fn get_payment(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<impl IntoResponse, PaymentError> {
    let tx = state
        .orchestrator
        .get_transaction(query.tenant_id, transaction_id)
        .await?;
    Ok(Json(tx))
}
