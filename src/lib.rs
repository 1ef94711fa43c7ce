pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod providers;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::services::PaymentOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/payments/:id/refunds",
            post(handlers::payments::create_refund),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
