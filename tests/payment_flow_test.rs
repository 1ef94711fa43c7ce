//! End-to-end orchestration tests against a live Postgres instance.
//!
//! Run with a migrated database:
//!   DATABASE_URL=postgres://... cargo test -- --ignored

use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use canopy_payments::db::models::{FeeSplit, ProviderType, TransactionStatus};
use canopy_payments::error::PaymentError;
use canopy_payments::secrets::StaticCredentialStore;
use canopy_payments::services::orchestrator::{PaymentRequest, RefundRequest};
use canopy_payments::services::{
    CircuitBreaker, FeeSplitCalculator, IdempotencyStore, PaymentOrchestrator, ProviderSelector,
    RetryExecutor, TransactionLedger,
};

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

async fn setup_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    sqlx::migrate::Migrator::new(Path::new("./migrations"))
        .await
        .expect("Failed to load migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn seed_provider(
    pool: &PgPool,
    tenant_id: Uuid,
    provider: ProviderType,
    priority: i32,
    base_url: &str,
    daily_limit: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO tenant_providers (
            id, tenant_id, provider, priority, api_base_url, daily_limit, enabled
        ) VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(provider)
    .bind(priority)
    .bind(base_url)
    .bind(daily_limit.map(dec))
    .execute(pool)
    .await
    .expect("Failed to seed tenant provider");
}

fn credentials_for(tenant_id: Uuid) -> Arc<StaticCredentialStore> {
    let mut store = StaticCredentialStore::new();
    store.insert(
        tenant_id,
        ProviderType::Aeropay,
        HashMap::from([
            ("api_key".to_string(), "sk_test".to_string()),
            ("merchant_id".to_string(), "mch_test".to_string()),
        ]),
    );
    store.insert(
        tenant_id,
        ProviderType::Stronghold,
        HashMap::from([("secret_key".to_string(), "sh_sk_test".to_string())]),
    );
    Arc::new(store)
}

fn build_orchestrator(
    pool: PgPool,
    credentials: Arc<StaticCredentialStore>,
) -> (Arc<PaymentOrchestrator>, Arc<CircuitBreaker>) {
    let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(300)));
    let selector = ProviderSelector::new(
        pool.clone(),
        credentials,
        breaker.clone(),
        Duration::from_secs(5),
    );
    let orchestrator = PaymentOrchestrator::new(
        TransactionLedger::new(pool.clone()),
        selector,
        IdempotencyStore::new(pool, 24),
        RetryExecutor::new(3, Duration::from_millis(10), Duration::from_secs(15)),
        FeeSplitCalculator::new(dec("0.02"), dec("0.00")),
        breaker.clone(),
    );
    (Arc::new(orchestrator), breaker)
}

fn payment_request(tenant_id: Uuid, amount: &str) -> PaymentRequest {
    PaymentRequest {
        tenant_id,
        amount: dec(amount),
        currency: "CAD".to_string(),
        payment_method_id: None,
        order_id: None,
        customer_id: None,
        store_id: None,
        provider_type: None,
        description: None,
        metadata: None,
        idempotency_key: None,
    }
}

async fn fee_split_for(pool: &PgPool, transaction_id: Uuid) -> FeeSplit {
    sqlx::query_as::<_, FeeSplit>("SELECT * FROM fee_splits WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_one(pool)
        .await
        .expect("fee split should exist")
}

#[tokio::test]
#[ignore] // requires Postgres
async fn charge_refund_and_refund_limit_flow() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let mut server = mockito::Server::new_async().await;
    let _charge = server
        .mock("POST", "/v1/transactions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "approved", "transaction_id": "aero_1001"}"#)
        .create_async()
        .await;
    let _refund = server
        .mock("POST", "/v1/refunds")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "approved", "transaction_id": "aero_rf_1"}"#)
        .create_async()
        .await;

    seed_provider(&pool, tenant_id, ProviderType::Aeropay, 0, &server.url(), None).await;
    let (orchestrator, _) = build_orchestrator(pool.clone(), credentials_for(tenant_id));

    // $100.00 charge at the default 2% + $0 fee config.
    let result = orchestrator
        .process_payment(payment_request(tenant_id, "100.00"))
        .await
        .expect("charge should complete");

    assert_eq!(result.status, TransactionStatus::Completed);
    assert_eq!(result.amount, dec("100.00"));
    assert_eq!(result.provider, ProviderType::Aeropay);
    assert_eq!(result.provider_transaction_id.as_deref(), Some("aero_1001"));

    let split = fee_split_for(&pool, result.transaction_id).await;
    assert_eq!(split.gross_amount, dec("100.00"));
    assert_eq!(split.platform_fee, dec("2.00"));
    assert_eq!(split.tenant_net_amount, dec("98.00"));

    // $40.00 partial refund adjusts the split proportionally.
    let refund = orchestrator
        .refund_payment(
            tenant_id,
            result.transaction_id,
            RefundRequest {
                amount: Some(dec("40.00")),
                reason: Some("customer return".to_string()),
                idempotency_key: None,
            },
        )
        .await
        .expect("refund should complete");

    assert_eq!(refund.status, TransactionStatus::Completed);
    assert_eq!(refund.amount, dec("40.00"));

    let split = fee_split_for(&pool, result.transaction_id).await;
    assert_eq!(split.platform_fee, dec("1.20"));
    assert_eq!(split.tenant_net_amount, dec("58.80"));
    // Gross is never rewritten; only the fee and net fields move.
    assert_eq!(split.gross_amount, dec("100.00"));

    // A further $65.00 would take cumulative refunds to $105.00 > $100.00.
    let rejected = orchestrator
        .refund_payment(
            tenant_id,
            result.transaction_id,
            RefundRequest {
                amount: Some(dec("65.00")),
                reason: None,
                idempotency_key: None,
            },
        )
        .await;

    assert!(matches!(rejected, Err(PaymentError::RefundLimitExceeded)));

    // The rejected attempt left no refund reservation behind.
    let held: BigDecimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0) FROM refunds
        WHERE original_transaction_id = $1 AND status IN ('pending', 'completed')
        "#,
    )
    .bind(result.transaction_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(held, dec("40.00"));
}

#[tokio::test]
#[ignore] // requires Postgres
async fn idempotent_replay_returns_same_transaction_once() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let mut server = mockito::Server::new_async().await;
    let charge_mock = server
        .mock("POST", "/v1/transactions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "approved", "transaction_id": "aero_2002"}"#)
        .expect(1)
        .create_async()
        .await;

    seed_provider(&pool, tenant_id, ProviderType::Aeropay, 0, &server.url(), None).await;
    let (orchestrator, _) = build_orchestrator(pool.clone(), credentials_for(tenant_id));

    let key = Uuid::new_v4().to_string();
    let mut request = payment_request(tenant_id, "55.00");
    request.idempotency_key = Some(key.clone());

    let first = orchestrator
        .process_payment(request.clone())
        .await
        .expect("first charge should complete");
    let second = orchestrator
        .process_payment(request.clone())
        .await
        .expect("replay should return cached result");

    assert_eq!(first.transaction_id, second.transaction_id);
    // Exactly one provider call and one ledger row.
    charge_mock.assert_async().await;
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE tenant_id = $1 AND transaction_type = 'charge'",
    )
    .bind(tenant_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);

    // Same key, different amount: client error, no new transaction.
    let mut tampered = payment_request(tenant_id, "99.00");
    tampered.idempotency_key = Some(key);
    let mismatch = orchestrator.process_payment(tampered).await;
    assert!(matches!(mismatch, Err(PaymentError::IdempotencyMismatch)));

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE tenant_id = $1 AND transaction_type = 'charge'",
    )
    .bind(tenant_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore] // requires Postgres
async fn open_breaker_fails_over_to_secondary_provider() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let mut aeropay = mockito::Server::new_async().await;
    let _unused = aeropay
        .mock("POST", "/v1/transactions")
        .with_status(200)
        .with_body(r#"{"status": "approved", "transaction_id": "aero_should_be_skipped"}"#)
        .expect(0)
        .create_async()
        .await;

    let mut stronghold = mockito::Server::new_async().await;
    let _charge = stronghold
        .mock("POST", "/v2/charges")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result": {"id": "ch_77", "state": "captured"}}"#)
        .create_async()
        .await;

    seed_provider(&pool, tenant_id, ProviderType::Aeropay, 0, &aeropay.url(), None).await;
    seed_provider(
        &pool,
        tenant_id,
        ProviderType::Stronghold,
        1,
        &stronghold.url(),
        None,
    )
    .await;

    let (orchestrator, breaker) = build_orchestrator(pool.clone(), credentials_for(tenant_id));

    // Trip the primary's breaker; selection must skip it.
    for _ in 0..5 {
        breaker.record_failure(tenant_id, ProviderType::Aeropay);
    }

    let result = orchestrator
        .process_payment(payment_request(tenant_id, "20.00"))
        .await
        .expect("failover charge should complete");

    assert_eq!(result.provider, ProviderType::Stronghold);
    assert_eq!(result.provider_transaction_id.as_deref(), Some("ch_77"));
}

#[tokio::test]
#[ignore] // requires Postgres
async fn daily_limit_blocks_before_provider_call() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let mut server = mockito::Server::new_async().await;
    let charge_mock = server
        .mock("POST", "/v1/transactions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "approved", "transaction_id": "aero_3003"}"#)
        .expect(1)
        .create_async()
        .await;

    seed_provider(
        &pool,
        tenant_id,
        ProviderType::Aeropay,
        0,
        &server.url(),
        Some("150.00"),
    )
    .await;
    let (orchestrator, _) = build_orchestrator(pool.clone(), credentials_for(tenant_id));

    orchestrator
        .process_payment(payment_request(tenant_id, "100.00"))
        .await
        .expect("first charge fits the limit");

    let over = orchestrator
        .process_payment(payment_request(tenant_id, "60.00"))
        .await;
    assert!(matches!(over, Err(PaymentError::DailyLimitExceeded)));

    // Only the first charge reached the provider.
    charge_mock.assert_async().await;
}

#[tokio::test]
#[ignore] // requires Postgres
async fn decline_is_recorded_and_not_retried() {
    let pool = setup_pool().await;
    let tenant_id = Uuid::new_v4();

    let mut server = mockito::Server::new_async().await;
    let charge_mock = server
        .mock("POST", "/v1/transactions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status": "declined", "decline_code": "INSUFFICIENT_FUNDS", "decline_reason": "insufficient funds"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    seed_provider(&pool, tenant_id, ProviderType::Aeropay, 0, &server.url(), None).await;
    let (orchestrator, _) = build_orchestrator(pool.clone(), credentials_for(tenant_id));

    let result = orchestrator
        .process_payment(payment_request(tenant_id, "30.00"))
        .await;

    match result {
        Err(PaymentError::ProviderDeclined { code, .. }) => {
            assert_eq!(code, "INSUFFICIENT_FUNDS");
        }
        other => panic!("expected decline, got {:?}", other.err()),
    }

    // Declines are terminal: one attempt, one failed ledger row.
    charge_mock.assert_async().await;
    let status: String = sqlx::query_scalar(
        "SELECT status::text FROM transactions WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "failed");
}
