use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy_payments::config::Config;
use canopy_payments::secrets::VaultCredentialStore;
use canopy_payments::services::{
    CircuitBreaker, FeeSplitCalculator, IdempotencyStore, PaymentOrchestrator, ProviderSelector,
    RetryExecutor, TransactionLedger,
};
use canopy_payments::{create_app, db, startup, AppState};

const PURGE_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    report.log();
    if !report.is_valid() {
        anyhow::bail!("startup validation failed");
    }

    let credentials = Arc::new(VaultCredentialStore::from_env().await?);
    tracing::info!("credential store initialized");

    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_reset_timeout(),
    ));
    let selector = ProviderSelector::new(
        pool.clone(),
        credentials,
        breaker.clone(),
        config.provider_timeout(),
    );
    let ledger = TransactionLedger::new(pool.clone());
    let idempotency = IdempotencyStore::new(pool.clone(), config.idempotency_retention_hours);
    let retry = RetryExecutor::new(
        config.retry_max_attempts,
        config.retry_base_delay(),
        config.retry_max_backoff(),
    );
    let fees = FeeSplitCalculator::new(
        config.default_percentage_fee.clone(),
        config.default_fixed_fee.clone(),
    );

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        ledger,
        selector,
        idempotency.clone(),
        retry,
        fees,
        breaker,
    ));

    // Background retention sweep for expired idempotency records.
    tokio::spawn(run_idempotency_purge(idempotency));

    let app_state = AppState {
        db: pool,
        orchestrator,
    };
    let app = create_app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_idempotency_purge(store: IdempotencyStore) {
    loop {
        if let Err(e) = store.purge_expired().await {
            tracing::error!(error = %e, "idempotency purge failed");
        }
        tokio::time::sleep(Duration::from_secs(PURGE_INTERVAL_SECS)).await;
    }
}
