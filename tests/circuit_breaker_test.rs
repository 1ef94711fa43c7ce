use std::time::Duration;
use uuid::Uuid;

use canopy_payments::db::models::ProviderType;
use canopy_payments::services::CircuitBreaker;

#[test]
fn breaker_opens_at_threshold_and_skips_provider() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(300));
    let tenant = Uuid::new_v4();

    for _ in 0..4 {
        breaker.record_failure(tenant, ProviderType::Aeropay);
        assert!(!breaker.is_open(tenant, ProviderType::Aeropay));
    }

    breaker.record_failure(tenant, ProviderType::Aeropay);
    assert!(breaker.is_open(tenant, ProviderType::Aeropay));

    // Failover target stays available.
    assert!(!breaker.is_open(tenant, ProviderType::Stronghold));
}

#[test]
fn breaker_recloses_after_timeout_and_success_resets() {
    let breaker = CircuitBreaker::new(2, Duration::from_millis(30));
    let tenant = Uuid::new_v4();

    breaker.record_failure(tenant, ProviderType::Stronghold);
    breaker.record_failure(tenant, ProviderType::Stronghold);
    assert!(breaker.is_open(tenant, ProviderType::Stronghold));

    std::thread::sleep(Duration::from_millis(40));
    assert!(!breaker.is_open(tenant, ProviderType::Stronghold));
    assert_eq!(breaker.failure_count(tenant, ProviderType::Stronghold), 0);

    // One new failure does not reopen; success clears it entirely.
    breaker.record_failure(tenant, ProviderType::Stronghold);
    assert!(!breaker.is_open(tenant, ProviderType::Stronghold));
    breaker.record_success(tenant, ProviderType::Stronghold);
    assert_eq!(breaker.failure_count(tenant, ProviderType::Stronghold), 0);
}

#[test]
fn breakers_are_independent_across_tenants() {
    let breaker = CircuitBreaker::new(1, Duration::from_secs(300));
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    breaker.record_failure(tenant_a, ProviderType::Aeropay);

    assert!(breaker.is_open(tenant_a, ProviderType::Aeropay));
    assert!(!breaker.is_open(tenant_b, ProviderType::Aeropay));
}

#[test]
fn concurrent_failure_recordings_are_not_lost() {
    use std::sync::Arc;

    let breaker = Arc::new(CircuitBreaker::new(100, Duration::from_secs(300)));
    let tenant = Uuid::new_v4();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let breaker = breaker.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    breaker.record_failure(tenant, ProviderType::Aeropay);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(breaker.failure_count(tenant, ProviderType::Aeropay), 100);
    assert!(breaker.is_open(tenant, ProviderType::Aeropay));
}
